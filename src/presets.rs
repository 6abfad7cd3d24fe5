// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Named parameter presets and their JSON interchange format.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::params::{Layer, ParameterSet};

/// A named set of knob values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub values: ParameterSet,
}

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("preset document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("preset document must be a list of presets")]
    NotAList,
    #[error("preset {index} is missing a name")]
    MissingName { index: usize },
    #[error("preset {index} is missing its values")]
    MissingValues { index: usize },
    #[error("preset {index} has invalid values: {cause}")]
    InvalidValues { index: usize, cause: String },
    #[error("no preset named {0:?}")]
    NotFound(String),
    #[error("unable to access preset file: {0}")]
    Io(#[from] std::io::Error),
}

fn preset(name: &str, values: [f32; 6], base_layer: u8) -> Preset {
    let [volume, cutoff, mix, motion, ambience, fade_time] = values;
    Preset {
        name: name.to_string(),
        values: ParameterSet {
            volume,
            cutoff,
            mix,
            motion,
            ambience,
            fade_time,
            base_layer: Layer::new(base_layer).unwrap_or_default(),
        },
    }
}

/// The presets shipped with the pad.
pub fn defaults() -> Vec<Preset> {
    vec![
        preset("Padrão", [70.0, 80.0, 50.0, 20.0, 30.0, 5.0], 1),
        preset("Dark & Moody", [65.0, 40.0, 25.0, 40.0, 50.0, 7.0], 2),
        preset("Bright Shimmer", [75.0, 95.0, 50.0, 10.0, 20.0, 3.0], 3),
        preset("Ambient Swell", [70.0, 60.0, 70.0, 60.0, 80.0, 8.0], 1),
    ]
}

/// Finds a preset by name, ignoring case.
pub fn find<'a>(presets: &'a [Preset], name: &str) -> Result<&'a Preset, PresetError> {
    presets
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| PresetError::NotFound(name.to_string()))
}

/// Serializes presets into the interchange document.
pub fn export(presets: &[Preset]) -> Result<String, PresetError> {
    Ok(serde_json::to_string_pretty(presets)?)
}

/// Parses an interchange document. Any bad record rejects the whole import.
pub fn import(document: &str) -> Result<Vec<Preset>, PresetError> {
    let value: Value = serde_json::from_str(document)?;
    let records = value.as_array().ok_or(PresetError::NotAList)?;

    let mut presets = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .ok_or(PresetError::MissingName { index })?;
        let values = record
            .get("values")
            .filter(|values| values.is_object())
            .ok_or(PresetError::MissingValues { index })?;
        let values: ParameterSet =
            serde_json::from_value(values.clone()).map_err(|e| PresetError::InvalidValues {
                index,
                cause: e.to_string(),
            })?;

        presets.push(Preset {
            name: name.to_string(),
            values,
        });
    }

    Ok(presets)
}

/// Writes presets to a file.
pub fn save(path: &Path, presets: &[Preset]) -> Result<(), PresetError> {
    fs::write(path, export(presets)?)?;
    info!(path = ?path, count = presets.len(), "Exported presets");
    Ok(())
}

/// Reads presets from a file.
pub fn load(path: &Path) -> Result<Vec<Preset>, PresetError> {
    let presets = import(&fs::read_to_string(path)?)?;
    info!(path = ?path, count = presets.len(), "Imported presets");
    Ok(presets)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip() -> Result<(), PresetError> {
        let presets = defaults();
        let imported = import(&export(&presets)?)?;
        assert_eq!(presets, imported);
        Ok(())
    }

    #[test]
    fn test_interchange_field_names() -> Result<(), PresetError> {
        let document = r#"[
            {"name": "Custom", "values": {"volume": 10, "cutoff": 20, "mix": 30,
             "motion": 40, "ambience": 50, "fadeTime": 6, "baseLayer": 3}}
        ]"#;
        let presets = import(document)?;
        assert_eq!(1, presets.len());
        assert_eq!("Custom", presets[0].name);
        assert_eq!(6.0, presets[0].values.fade_time);
        assert_eq!(3, presets[0].values.base_layer.index());

        let exported = export(&presets)?;
        assert!(exported.contains("\"fadeTime\""));
        assert!(exported.contains("\"baseLayer\": 3"));
        Ok(())
    }

    #[test]
    fn test_import_rejects_whole_document() {
        let missing_name = r#"[
            {"name": "Good", "values": {"volume": 1, "cutoff": 2, "mix": 3,
             "motion": 4, "ambience": 5, "fadeTime": 6, "baseLayer": 1}},
            {"values": {}}
        ]"#;
        assert!(matches!(
            import(missing_name),
            Err(PresetError::MissingName { index: 1 })
        ));

        let values_not_object = r#"[{"name": "Bad", "values": 12}]"#;
        assert!(matches!(
            import(values_not_object),
            Err(PresetError::MissingValues { index: 0 })
        ));

        let bad_layer = r#"[{"name": "Bad", "values": {"volume": 1, "cutoff": 2,
            "mix": 3, "motion": 4, "ambience": 5, "fadeTime": 6, "baseLayer": 9}}]"#;
        assert!(matches!(
            import(bad_layer),
            Err(PresetError::InvalidValues { index: 0, .. })
        ));

        assert!(matches!(import("{}"), Err(PresetError::NotAList)));
        assert!(matches!(import("not json"), Err(PresetError::Json(_))));
    }

    #[test]
    fn test_find() {
        let presets = defaults();
        assert_eq!("Dark & Moody", find(&presets, "dark & moody").unwrap().name);
        assert!(matches!(
            find(&presets, "missing"),
            Err(PresetError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("presets.json");
        save(&path, &defaults())?;
        assert_eq!(defaults(), load(&path)?);
        Ok(())
    }
}
