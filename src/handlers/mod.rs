//! Event handlers (C5): per-schema normalizers dispatched from the ingestor.

pub mod approach_settlement;
pub mod commodity;
pub mod discovery_scan;
pub mod journal;
pub mod nav_route;

use crate::db::Stores;
use crate::error::IngestError;
use crate::sector::SectorHasher;
use crate::statement_cache::StatementCache;

/// Minimum accepted game-version major component (§4.3).
pub const MIN_VERSION_MAJOR: u32 = 4;
/// Version strings with this prefix bypass the major-version check entirely.
pub const AUTHORITATIVE_API_PREFIX: &str = "CAPI-Live-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Commodity,
    DiscoveryScan,
    NavRoute,
    ApproachSettlement,
    Journal,
}

/// Classifies a `$schemaRef` URL into one of the recognized schemas, or `None` if it is outside
/// the recognized set (dropped silently per §7).
pub fn classify(schema_ref: &str) -> Option<Schema> {
    let lower = schema_ref.to_ascii_lowercase();
    if lower.contains("/commodity/") {
        Some(Schema::Commodity)
    } else if lower.contains("/fssdiscoveryscan/") {
        Some(Schema::DiscoveryScan)
    } else if lower.contains("/navroute/") {
        Some(Schema::NavRoute)
    } else if lower.contains("/approachsettlement/") {
        Some(Schema::ApproachSettlement)
    } else if lower.contains("/journal/") {
        Some(Schema::Journal)
    } else {
        None
    }
}

/// Shared version gate (§4.3): rejects any payload whose major version is below the minimum
/// unless it carries the authoritative-API prefix.
pub fn version_gate(gameversion: &str) -> Result<(), IngestError> {
    if gameversion.starts_with(AUTHORITATIVE_API_PREFIX) {
        return Ok(());
    }
    let major: Option<u32> = gameversion.split('.').next().and_then(|s| s.parse().ok());
    match major {
        Some(m) if m >= MIN_VERSION_MAJOR => Ok(()),
        _ => Err(IngestError::VersionRejected(gameversion.to_string())),
    }
}

/// Everything a handler needs: the four store connections, the shared statement cache and the
/// sector hasher. Cloning is cheap (each field is an `Arc` internally).
#[derive(Clone)]
pub struct HandlerContext {
    pub stores: Stores,
    pub statements: std::sync::Arc<StatementCache>,
    pub sectors: SectorHasher,
}
