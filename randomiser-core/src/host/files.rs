//! World files and installed-object discovery for the file-backed host.

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::memory::{ObjectDefinition, WorldState};
use crate::identity::classify;
use crate::item::ObjectKind;
use crate::{ResearchError, Result};

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Read a world file; a `.gz` suffix means gzip-compressed JSON.
pub fn load_world(path: &Path) -> Result<WorldState> {
    let raw = fs::read(path)?;
    let json = if is_gzip(path) {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut buf = Vec::new();
        decoder.read_to_end(&mut buf)?;
        buf
    } else {
        raw
    };
    Ok(serde_json::from_slice(&json)?)
}

pub fn save_world(path: &Path, world: &WorldState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec_pretty(world)?;
    if is_gzip(path) {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        fs::write(path, encoder.finish()?)?;
    } else {
        fs::write(path, json)?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorProperties {
    #[serde(default)]
    ride_types: Vec<i32>,
}

/// Subset of an `object.json` descriptor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectDescriptor {
    id: String,
    #[serde(default)]
    object_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    strings: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    source_game: Option<OneOrMany>,
    #[serde(default)]
    properties: DescriptorProperties,
}

impl ObjectDescriptor {
    fn into_definition(self) -> Option<ObjectDefinition> {
        let kind = match self.object_type.as_deref() {
            Some("ride") => ObjectKind::Ride,
            Some("scenery_group") => ObjectKind::SceneryGroup,
            Some(_) => return None,
            None => classify(&self.id)?,
        };
        let name = self
            .name
            .or_else(|| {
                let names = self.strings.get("name")?;
                names
                    .get("en-GB")
                    .or_else(|| names.get("en-US"))
                    .or_else(|| names.values().next())
                    .cloned()
            })
            .unwrap_or_default();
        Some(ObjectDefinition {
            kind,
            identifier: self.id,
            name,
            source_tags: self.source_game.map(OneOrMany::into_vec).unwrap_or_default(),
            variants: match kind {
                ObjectKind::Ride => self.properties.ride_types,
                ObjectKind::SceneryGroup => Vec::new(),
            },
        })
    }
}

fn parse_descriptor(json: &str) -> Result<Option<ObjectDefinition>> {
    let descriptor: ObjectDescriptor = serde_json::from_str(json)?;
    Ok(descriptor.into_definition())
}

fn read_parkobj(path: &Path) -> Result<Option<ObjectDefinition>> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut entry = archive.by_name("object.json")?;
    let mut json = String::new();
    entry.read_to_string(&mut json)?;
    parse_descriptor(&json)
}

/// Walk `dir` for loose `object.json` descriptors and `.parkobj` archives.
/// Unreadable entries are skipped with a warning.
pub fn discover_objects(dir: &Path) -> Result<Vec<ObjectDefinition>> {
    let mut found: BTreeMap<String, ObjectDefinition> = BTreeMap::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable object directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_ascii_lowercase();

        let parsed = if file_name == "object.json" {
            fs::read_to_string(path)
                .map_err(ResearchError::from)
                .and_then(|json| parse_descriptor(&json))
        } else if file_name.ends_with(".parkobj") {
            read_parkobj(path)
        } else {
            continue;
        };

        match parsed {
            Ok(Some(definition)) => {
                debug!(identifier = %definition.identifier, path = %path.display(), "discovered object");
                found.insert(definition.identifier.clone(), definition);
            }
            Ok(None) => {}
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable object"),
        }
    }

    Ok(found.into_values().collect())
}

/// Add discovered objects the world does not already list. Returns how many
/// were added.
pub fn merge_installed(world: &mut WorldState, discovered: Vec<ObjectDefinition>) -> usize {
    let mut added = 0;
    for definition in discovered {
        if world
            .objects
            .iter()
            .any(|o| o.identifier == definition.identifier)
        {
            continue;
        }
        world.objects.push(definition);
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;

    const MGR_JSON: &str = r#"{
        "id": "rct2.ride.mgr1",
        "objectType": "ride",
        "sourceGame": "rct2",
        "strings": { "name": { "en-GB": "Merry-Go-Round" } },
        "properties": { "rideTypes": [12] }
    }"#;

    #[test]
    fn world_round_trips_through_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("park.json.gz");

        let mut world = WorldState::default();
        world.level.name = "Dynamite Dunes".to_string();
        world.variant_categories.insert(12, Category::Gentle);
        save_world(&path, &world).unwrap();

        let raw = fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert_eq!(load_world(&path).unwrap(), world);
    }

    #[test]
    fn discovers_loose_and_archived_objects() {
        let dir = tempfile::tempdir().unwrap();
        let loose = dir.path().join("rides").join("mgr1");
        fs::create_dir_all(&loose).unwrap();
        fs::write(loose.join("object.json"), MGR_JSON).unwrap();

        let archive_path = dir.path().join("trees.parkobj");
        let mut writer = zip::ZipWriter::new(File::create(&archive_path).unwrap());
        writer
            .start_file("object.json", zip::write::FileOptions::default())
            .unwrap();
        writer
            .write_all(
                br#"{"id":"custom.scenery_group.palms","objectType":"scenery_group","name":"Palms"}"#,
            )
            .unwrap();
        writer.finish().unwrap();

        fs::write(dir.path().join("readme.txt"), "ignored").unwrap();
        fs::write(
            dir.path().join("object.json"),
            r#"{"id":"rct2.footpath.tarmac","objectType":"footpath"}"#,
        )
        .unwrap();

        let objects = discover_objects(dir.path()).unwrap();
        assert_eq!(objects.len(), 2);

        let palms = objects
            .iter()
            .find(|o| o.identifier == "custom.scenery_group.palms")
            .unwrap();
        assert_eq!(palms.kind, ObjectKind::SceneryGroup);
        assert!(palms.source_tags.is_empty());

        let mgr = objects
            .iter()
            .find(|o| o.identifier == "rct2.ride.mgr1")
            .unwrap();
        assert_eq!(mgr.name, "Merry-Go-Round");
        assert_eq!(mgr.variants, vec![12]);
        assert_eq!(mgr.source_tags, vec!["rct2".to_string()]);
    }

    #[test]
    fn descriptor_without_type_falls_back_to_identifier() {
        let ride = parse_descriptor(r#"{"id":"rct2.ride.twist1","properties":{"rideTypes":[20]}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(ride.kind, ObjectKind::Ride);
        assert_eq!(ride.variants, vec![20]);
        assert!(parse_descriptor(r#"{"id":"rct2.footpath.tarmac"}"#).unwrap().is_none());
    }

    #[test]
    fn merge_keeps_existing_definitions() {
        let mut world = WorldState::default();
        world
            .objects
            .push(ObjectDefinition::ride("rct2.ride.mgr1", "Old name", &[12]));
        let added = merge_installed(
            &mut world,
            vec![
                ObjectDefinition::ride("rct2.ride.mgr1", "New name", &[12]),
                ObjectDefinition::group("rct2.scenery_group.scgtrees", "Trees"),
            ],
        );
        assert_eq!(added, 1);
        assert_eq!(world.objects[0].name, "Old name");
    }
}
