//! Mapping between stable identifiers and the transient handles the host
//! assigns on load.

use tracing::debug;

use crate::host::{LoadedObject, ObjectHandle, ResourceHost};
use crate::item::{ObjectKind, Variant};

/// Classify an identifier such as `rct2.ride.mgr1` by its type segment.
pub fn classify(identifier: &str) -> Option<ObjectKind> {
    let mut parts = identifier.split('.');
    let _source = parts.next()?;
    match parts.next()? {
        "ride" => Some(ObjectKind::Ride),
        "scenery_group" => Some(ObjectKind::SceneryGroup),
        _ => None,
    }
}

pub fn resolve_identifier<H: ResourceHost + ?Sized>(
    host: &H,
    kind: ObjectKind,
    handle: ObjectHandle,
) -> Option<String> {
    host.loaded_object(kind, handle).map(|obj| obj.identifier)
}

pub fn resolve_handle<H: ResourceHost + ?Sized>(
    host: &H,
    kind: ObjectKind,
    identifier: &str,
) -> Option<LoadedObject> {
    match host.loaded_objects(kind) {
        Ok(objects) => objects.into_iter().find(|o| o.identifier == identifier),
        Err(err) => {
            debug!(identifier, error = %err, "could not list loaded objects");
            None
        }
    }
}

/// Resolve `identifier`, requesting a load first if needed. Load failures
/// come back as `false`.
pub fn ensure_loaded<H: ResourceHost + ?Sized>(
    host: &mut H,
    kind: ObjectKind,
    identifier: &str,
) -> bool {
    if resolve_handle(host, kind, identifier).is_some() {
        return true;
    }
    if let Err(err) = host.load_object(identifier) {
        debug!(identifier, error = %err, "load request failed");
    }
    resolve_handle(host, kind, identifier).is_some()
}

/// Valid variants of a loaded object, deduplicated in host order.
pub fn list_variants(object: &LoadedObject) -> Vec<Variant> {
    let mut out: Vec<Variant> = Vec::new();
    for variant in object.variants.iter().copied().filter_map(Variant::from_raw) {
        if !out.contains(&variant) {
            out.push(variant);
        }
    }
    out
}

/// Pick a variant for a ride identifier, keeping `preferred` when the object
/// still offers it.
pub fn choose_variant<H: ResourceHost + ?Sized>(
    host: &mut H,
    identifier: &str,
    preferred: Option<i32>,
) -> Option<Variant> {
    if !ensure_loaded(host, ObjectKind::Ride, identifier) {
        return None;
    }
    let object = resolve_handle(host, ObjectKind::Ride, identifier)?;
    let options = list_variants(&object);
    if let Some(wanted) = preferred.and_then(Variant::from_raw) {
        if options.contains(&wanted) {
            return Some(wanted);
        }
    }
    options.first().copied()
}
