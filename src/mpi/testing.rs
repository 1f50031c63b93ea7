//! Harness for tests that need several MPI ranks.
//!
//! [`mpi_test!`](crate::mpi_test) expands to a plain `#[test]` that relaunches the
//! current test binary under `mpirun`, filtered to an ignored twin test holding
//! the actual body. The launcher can be overridden through `DTENSOR_MPIRUN`.

use std::env;
use std::process::Command;

const LAUNCHER_VAR: &str = "DTENSOR_MPIRUN";

/// Strips the crate name from `module_path` and appends `test_name`, giving the
/// filter the test harness matches exactly.
pub fn test_filter(module_path: &str, test_name: &str) -> String {
    match module_path.split_once("::") {
        Some((_, inner)) => format!("{inner}::{test_name}"),
        None => test_name.to_owned(),
    }
}

/// Command that runs the ignored test `filter` of the current binary on
/// `processes` ranks.
pub fn launch_command(filter: &str, processes: usize) -> Command {
    let launcher = env::var(LAUNCHER_VAR).unwrap_or_else(|_| "mpirun".to_owned());
    let binary = env::current_exe().expect("test binary has a path");
    let mut command = Command::new(launcher);
    command
        .args(["-n", &processes.to_string()])
        .args(["--allow-run-as-root", "--oversubscribe"])
        .arg(binary)
        .arg(filter)
        .args(["--ignored", "--exact", "--test-threads=1"]);
    command
}

/// Runs the ignored test `filter` on `processes` ranks.
///
/// # Panics
/// Panics if the launcher cannot be started or any rank fails.
pub fn run_on_ranks(filter: &str, processes: usize) {
    let status = launch_command(filter, processes)
        .status()
        .expect("failed to start the MPI launcher");
    assert!(status.success(), "{filter} failed on {processes} ranks: {status}");
}

/// Declares a test whose body runs on `$processes` MPI ranks.
///
/// ```ignore
/// mpi_test!(4, fn test_gather() {
///     let env = Environment::initialize().unwrap();
///     // ...
/// });
/// ```
#[macro_export]
macro_rules! mpi_test {
    ($processes:expr, fn $name:ident $_:tt $body:block) => {
        $crate::__paste! {
            #[test]
            fn $name() {
                let filter = $crate::mpi::testing::test_filter(
                    module_path!(),
                    concat!(stringify!($name), "_on_ranks"),
                );
                $crate::mpi::testing::run_on_ranks(&filter, $processes);
            }

            #[test]
            #[ignore = "runs under mpirun"]
            fn [<$name _on_ranks>]() $body
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_drops_crate_name() {
        assert_eq!(test_filter("integration_tests", "t"), "t");
        assert_eq!(test_filter("dtensor::network::tests", "t"), "network::tests::t");
    }

    #[test]
    fn test_launch_command() {
        let command = launch_command("a::b", 3);
        let args = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(args[..2], ["-n", "3"]);
        assert!(args.ends_with(&[
            "a::b".to_owned(),
            "--ignored".to_owned(),
            "--exact".to_owned(),
            "--test-threads=1".to_owned(),
        ]));
    }
}
