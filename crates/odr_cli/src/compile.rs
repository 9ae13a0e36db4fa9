//! The `odrefresh compile` and `odrefresh force-compile` actions.

use std::error::Error;
use std::time::{SystemTime, UNIX_EPOCH};

use odr_cache::{CompilationLog, LogEntry, Trigger};
use odr_refresh::{ExitCode, OnDeviceRefresh};

use crate::GlobalArgs;

/// Checks the artifacts and compiles what is stale.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let refresh = OnDeviceRefresh::new(global.load_config()?);
    Ok(check_and_compile(&refresh, now_secs()).code())
}

/// Discards every artifact and compiles everything.
pub fn run_force(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let refresh = OnDeviceRefresh::new(global.load_config()?);
    Ok(refresh.force_compile().code())
}

/// Compiles stale artifacts unless recent attempts failed.
///
/// Every attempt is recorded in the compilation log so repeated failures
/// back off.
fn check_and_compile(refresh: &OnDeviceRefresh, now_secs: u64) -> ExitCode {
    let result = refresh.check();
    if result.exit_code != ExitCode::CompilationRequired {
        return result.exit_code;
    }
    let art = match refresh.art_module() {
        Ok(art) => art,
        Err(e) => {
            log::error!("cannot compile: {e}");
            return ExitCode::CompilationFailed;
        }
    };
    let trigger = result.trigger.unwrap_or(Trigger::Unknown);

    let mut attempts = CompilationLog::load(&refresh.config().paths.compilation_log);
    if !attempts.should_attempt_compile(art.version_code, art.last_update_millis, trigger, now_secs)
    {
        log::info!("skipping compilation after recent failed attempts");
        return ExitCode::CompilationFailed;
    }

    let exit_code = refresh.compile(&result.options);
    attempts.add(LogEntry {
        art_version: art.version_code,
        last_update_millis: art.last_update_millis,
        trigger,
        when_secs: now_secs,
        exit_code: exit_code.code(),
    });
    if let Err(e) = attempts.save() {
        log::warn!("cannot save compilation log: {e}");
    }
    exit_code
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
