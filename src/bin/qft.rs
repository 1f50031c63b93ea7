use std::f64::consts::{FRAC_1_SQRT_2, PI};

use clap::Parser;
use dtensor::environment::Environment;
use dtensor::error::Result;
use dtensor::network::TensorNetwork;
use dtensor::tensor::dense::DenseTensor;
use dtensor::tensor::structured::DiagonalTensor;
use dtensor::tensor::Tensor;
use dtensor::types::{PlacementParams, TensorId};
use dtensor::wires;
use flexi_logger::{json_format, Duplicate, FileSpec, Logger, LoggerHandle};
use log::{info, LevelFilter};
use num_complex::Complex64;

/// Applies the quantum Fourier transform to the uniform superposition by
/// contracting the circuit as a distributed tensor network.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of qubits.
    #[arg(short, long, default_value_t = 4)]
    qubits: usize,
    /// Number of leading qubits whose axes start out distributed. Needs at least
    /// 2^distributed processes.
    #[arg(short, long, default_value_t = 0)]
    distributed: usize,
    #[arg(short, long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
    /// Directory of the per-rank log files.
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

/// Sets up logging for rank `rank`. Each rank logs to a separate file and to stdout.
fn setup_logging_mpi(rank: usize, level: LevelFilter, directory: &str) -> LoggerHandle {
    Logger::with(level)
        .format(json_format)
        .log_to_file(
            FileSpec::default()
                .discriminant(format!("rank{rank}"))
                .suppress_timestamp()
                .suffix("log.json")
                .directory(directory),
        )
        .duplicate_to_stdout(Duplicate::Info)
        .start()
        .unwrap()
}

/// The open end of a qubit line.
#[derive(Debug, Clone, Copy)]
struct End {
    tensor: TensorId,
    axis: usize,
    distributed: bool,
}

fn plus_state(env: &Environment, qubits: usize, n_dis: usize) -> Result<Tensor<'_>> {
    let dims = vec![2; qubits];
    let amplitude = Complex64::new(FRAC_1_SQRT_2.powi(qubits as i32), 0.0);
    let elements = vec![amplitude; 1 << qubits];
    DenseTensor::distribute(env, &dims, n_dis, &elements, PlacementParams::default())
        .map(Tensor::from)
}

fn hadamard(env: &Environment, distributed: bool) -> Result<Tensor<'_>> {
    let h = Complex64::new(FRAC_1_SQRT_2, 0.0);
    DenseTensor::distribute(
        env,
        &[2, 2],
        usize::from(distributed),
        &[h, h, h, -h],
        PlacementParams::default(),
    )
    .map(Tensor::from)
}

fn controlled_phase(env: &Environment, angle: f64, n_dis: usize) -> Result<Tensor<'_>> {
    let one = Complex64::new(1.0, 0.0);
    let dims = [2; 4];
    let (dis_dims, loc_dims) = dims.split_at(n_dis);
    DiagonalTensor::new(
        env,
        dis_dims.to_vec(),
        loc_dims.to_vec(),
        vec![one, one, one, Complex64::from_polar(1.0, angle)],
        PlacementParams::default(),
    )
    .map(Tensor::from)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let env = Environment::initialize().unwrap();
    let _logger = setup_logging_mpi(env.rank(), args.log_level, &args.log_dir);
    info!(rank = env.rank(), size = env.size(), threads = env.threads(); "Logging setup");
    info!(qubits = args.qubits, distributed = args.distributed; "Configuration set");

    let n = args.qubits;
    let mut network = TensorNetwork::new(&env);
    let state = network.insert_tensor(plus_state(&env, n, args.distributed)?)?;
    let mut ends = (0..n)
        .map(|axis| End {
            tensor: state,
            axis,
            distributed: axis < args.distributed,
        })
        .collect::<Vec<_>>();

    for target in 0..n {
        let h = network.insert_tensor(hadamard(&env, ends[target].distributed)?)?;
        network.create_bond(ends[target].tensor, h, wires![(ends[target].axis, 0)])?;
        ends[target] = End {
            tensor: h,
            axis: 1,
            distributed: false,
        };

        for control in target + 1..n {
            let angle = PI / (1usize << (control - target)) as f64;
            // Distributed inputs lead the axes of the gate.
            let (first, second) = if ends[control].distributed {
                (control, target)
            } else {
                (target, control)
            };
            let n_dis = usize::from(ends[first].distributed) + usize::from(ends[second].distributed);
            let cp = network.insert_tensor(controlled_phase(&env, angle, n_dis)?)?;
            network.create_bond(ends[first].tensor, cp, wires![(ends[first].axis, 0)])?;
            network.create_bond(ends[second].tensor, cp, wires![(ends[second].axis, 1)])?;
            ends[first] = End {
                tensor: cp,
                axis: 2,
                distributed: false,
            };
            ends[second] = End {
                tensor: cp,
                axis: 3,
                distributed: false,
            };
        }
    }
    info!(tensors = network.len(), bonds = network.bond_ids().len(); "Network built");

    network.contract_all()?;
    for id in network.tensor_ids() {
        let result = network.take_tensor(id)?;
        let data = result.gather()?;
        if env.rank() == 0 {
            info!(id, dims:? = data.dims(), amplitudes:? = data.data(); "Contracted");
        }
    }
    Ok(())
}
