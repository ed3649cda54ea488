pub mod apply;
pub mod diff;
pub mod status;
pub mod validate;

use anyhow::Result;
use resmgr::backend::sqlplus::SqlplusBackend;

use crate::config::TierctlConfig;
use crate::{progress, ui};

/// Open a control-plane session, with a spinner while sqlplus logs on.
pub(crate) fn connect(config: &TierctlConfig) -> Result<SqlplusBackend> {
    let pb = progress::spinner("Connecting...");
    match SqlplusBackend::connect(config.sqlplus()) {
        Ok(plane) => {
            pb.finish_and_clear();
            Ok(plane)
        }
        Err(e) => {
            progress::finish_error(&pb, &format!("Connection failed: {e}"));
            ui::dim(e.category().advice());
            Err(e.into())
        }
    }
}
