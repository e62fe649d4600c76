//! Staleness comparison between the local inventory and the registry.

use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::error::Result;
use crate::inventory::LocalModel;
use crate::model_ref::{ModelRef, RefDefaults};
use crate::registry::{ManifestSource, RemoteIdentity};

/// Outcome of checking a single model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    UpToDate,
    Stale,
    Unknown,
}

pub fn classify(local: &LocalModel, remote: Option<&RemoteIdentity>) -> Freshness {
    match remote {
        None => Freshness::Unknown,
        Some(id) if id.matches(&local.digest) => Freshness::UpToDate,
        Some(_) => Freshness::Stale,
    }
}

/// Models whose registry identity differs from the local digest, in inventory
/// order. Up to `concurrency` lookups are in flight at once; results are
/// merged by inventory position.
pub async fn find_stale<S>(models: &[LocalModel], source: &S, defaults: &RefDefaults, concurrency: usize) -> Result<Vec<LocalModel>>
where
    S: ManifestSource + ?Sized,
{
    let refs = models
        .iter()
        .map(|m| ModelRef::parse(&m.name, defaults))
        .collect::<Result<Vec<_>>>()?;

    let verdicts: Vec<Freshness> = stream::iter(models.iter().zip(refs.iter()))
        .map(|(model, r)| async move {
            let remote = source.lookup(r).await?;
            let verdict = classify(model, remote.as_ref());
            debug!(model = %model.name, ?verdict, "freshness_checked");
            Ok::<_, crate::error::CoreError>(verdict)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let stale: Vec<LocalModel> = models
        .iter()
        .zip(verdicts)
        .filter(|(_, v)| *v == Freshness::Stale)
        .map(|(m, _)| m.clone())
        .collect();
    info!(checked = models.len(), stale = stale.len(), "staleness_check_complete");
    Ok(stale)
}
