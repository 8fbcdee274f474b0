//! Font database shared by title measurement and rasterization.

use std::sync::Arc;

use resvg::usvg::fontdb::{Database, Family, Query};
use tracing::debug;

/// Loads the system fonts.
///
/// If the generic `sans-serif` family does not resolve, it is pointed at
/// the first installed family so titles still lay out.
pub fn system_database() -> Arc<Database> {
    let mut db = Database::new();
    db.load_system_fonts();
    ensure_sans_serif(&mut db);
    debug!(faces = db.len(), "loaded system fonts");
    Arc::new(db)
}

fn ensure_sans_serif(db: &mut Database) {
    let query = Query {
        families: &[Family::SansSerif],
        ..Query::default()
    };
    if db.query(&query).is_some() {
        return;
    }

    let fallback = db
        .faces()
        .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
    if let Some(family) = fallback {
        debug!(family = %family, "using fallback sans-serif family");
        db.set_sans_serif_family(family);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_database_stays_empty() {
        let mut db = Database::new();
        ensure_sans_serif(&mut db);
        assert!(db.is_empty());
    }
}
