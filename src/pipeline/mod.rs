//! Extract, transform and load stages and the driver sequencing them.

use std::path::PathBuf;

use tracing::{error, info};

use crate::{config::Settings, error::Result};

pub mod extract;
pub mod load;
pub mod transform;

pub use extract::extract;
pub use load::{load, load_at};
pub use transform::{transform, Transformer};

/// Run extract, transform and load in order, stopping at the first failure.
///
/// Returns the path of the file written by the load stage.
#[tracing::instrument(name = "pipeline", skip_all)]
pub fn run(settings: &Settings) -> Result<PathBuf> {
    info!("starting pipeline run");

    let outcome = extract(settings)
        .and_then(|raw| Ok(Transformer::from(&settings.transform).transform(&raw)?))
        .and_then(|processed| load(&processed, settings));

    match &outcome {
        Ok(path) => info!(path = %path.display(), "pipeline run completed"),
        Err(err) => error!(stage = err.stage(), error = %err, "pipeline run failed"),
    }
    outcome
}
