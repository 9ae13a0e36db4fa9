//! The `odrefresh check` action.

use std::error::Error;

use odr_refresh::{ExitCode, OnDeviceRefresh};

use crate::GlobalArgs;

/// Reports whether any artifact needs compiling.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let refresh = OnDeviceRefresh::new(global.load_config()?);
    let result = refresh.check();
    if result.exit_code == ExitCode::CompilationRequired {
        log::info!(
            "compilation required for {} instruction sets and {} system server jars",
            result.options.boot_isas.len(),
            result.options.system_server_jars.len()
        );
    }
    Ok(result.exit_code.code())
}
