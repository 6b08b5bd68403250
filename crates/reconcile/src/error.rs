use thiserror::Error;

use gapfill_catalog::CatalogError;
use gapfill_provider::ProviderError;

/// Either inventory failed; nothing was reconciled.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
