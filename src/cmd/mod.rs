//! CLI command implementations.
//!
//! | Module   | Commands handled          |
//! |----------|---------------------------|
//! | `run`    | `Run`, `Resume`           |
//! | `status` | `Status`, `Checkpoints`   |
//! | `export` | `Export`                  |

pub mod export;
pub mod run;
pub mod status;

pub use export::cmd_export;
pub use run::{cmd_resume, cmd_run};
pub use status::{cmd_checkpoints, cmd_status};
