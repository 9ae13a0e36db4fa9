//! The `odrefresh verify` action.

use std::error::Error;

use odr_refresh::OnDeviceRefresh;

use crate::GlobalArgs;

/// Asks the analyzer whether the existing artifacts are usable.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let refresh = OnDeviceRefresh::new(global.load_config()?);
    Ok(refresh.verify().code())
}
