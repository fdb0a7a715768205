use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// Timestamp layout used for `mod_time`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Merged key/value metadata for one file.
///
/// Every value is a string, numeric and time fields included. Records are
/// built once (from an [`Entry`], a probe result, or an index line) and only
/// read afterwards. Serializes as a flat JSON object with sorted keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the filesystem-derived fields for `entry`.
    ///
    /// Always contains `path`, `dir`, `name`, `ext`, `basename`, `basepath`,
    /// `size`, `mode` and `mod_time`.
    pub fn from_entry(entry: &Entry) -> Self {
        let path = entry.path.to_string_lossy().into_owned();
        let name = entry.name();
        let ext = extension(&name).to_string();
        let dir = match entry.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
            _ => ".".to_string(),
        };
        let basename = name[..name.len() - ext.len()].to_string();
        let basepath = path.strip_suffix(ext.as_str()).unwrap_or(&path).to_string();
        let mod_time = format_mod_time(entry.info.modified);

        [
            ("path", path),
            ("dir", dir),
            ("name", name),
            ("ext", ext),
            ("basename", basename),
            ("basepath", basepath),
            ("size", entry.info.size.to_string()),
            ("mode", format!("{:o}", entry.info.mode)),
            ("mod_time", mod_time),
        ]
        .into_iter()
        .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Merge `right` into `self`; `right` wins on key collision.
    pub fn merge(mut self, right: Record) -> Record {
        self.fields.extend(right.fields);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for Record {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

/// Timestamps further than this from the epoch (about 250,000 years) are
/// outside what chrono can render.
const MAX_TIMESTAMP_SECS: i64 = 8_000_000_000_000;

/// `t` in local time, or `""` when it cannot be represented.
fn format_mod_time(t: SystemTime) -> String {
    let (secs, nanos) = match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (i64::try_from(d.as_secs()).ok(), d.subsec_nanos()),
        Err(before) => {
            let d = before.duration();
            let secs = i64::try_from(d.as_secs()).ok().map(|s| -s);
            match d.subsec_nanos() {
                0 => (secs, 0),
                n => (secs.and_then(|s| s.checked_sub(1)), 1_000_000_000 - n),
            }
        }
    };
    secs.filter(|s| s.abs() < MAX_TIMESTAMP_SECS)
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, nanos))
        .map(|utc| utc.with_timezone(&Local).format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

/// Extension of a file name including the leading dot, or `""` when there is
/// none.
fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) => &name[i..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::entry::FileInfo;

    fn entry(path: &str) -> Entry {
        Entry::new(
            path,
            FileInfo {
                size:     1024,
                mode:     0o644,
                modified: SystemTime::UNIX_EPOCH,
                is_dir:   false,
            },
        )
    }

    #[test]
    fn filesystem_fields() {
        let r = Record::from_entry(&entry("/music/album/song.mp3"));
        assert_eq!(r.get("path"), Some("/music/album/song.mp3"));
        assert_eq!(r.get("dir"), Some("/music/album"));
        assert_eq!(r.get("name"), Some("song.mp3"));
        assert_eq!(r.get("ext"), Some(".mp3"));
        assert_eq!(r.get("basename"), Some("song"));
        assert_eq!(r.get("basepath"), Some("/music/album/song"));
        assert_eq!(r.get("size"), Some("1024"));
        assert_eq!(r.get("mode"), Some("644"));
        assert_eq!(r.get("mod_time").map(str::len), Some(19));
    }

    #[test]
    fn bare_name_without_extension() {
        let r = Record::from_entry(&entry("README"));
        assert_eq!(r.get("dir"), Some("."));
        assert_eq!(r.get("ext"), Some(""));
        assert_eq!(r.get("basename"), Some("README"));
        assert_eq!(r.get("basepath"), Some("README"));
    }

    #[test]
    fn mod_time_out_of_range_is_empty() {
        if let Some(far) = SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(1 << 62)) {
            assert_eq!(format_mod_time(far), "");
        }
        if let Some(before) = SystemTime::UNIX_EPOCH.checked_sub(Duration::from_millis(1500)) {
            let s = format_mod_time(before);
            assert_eq!(s.len(), 19);
            assert!(s.starts_with("1969-12-31") || s.starts_with("1970-01-01"));
        }
    }

    #[test]
    fn merge_is_right_biased() {
        let left: Record = [("a", "1"), ("b", "2")].into_iter().collect();
        let right: Record = [("b", "3"), ("c", "4")].into_iter().collect();

        let merged = left.merge(right);
        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("3"));
        assert_eq!(merged.get("c"), Some("4"));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn json_is_a_flat_sorted_object() {
        let r: Record = [("z", "1"), ("a", "2")].into_iter().collect();
        assert_eq!(r.to_json().unwrap(), r#"{"a":"2","z":"1"}"#);

        let back: Record = serde_json::from_str(r#"{"a":"2","z":"1"}"#).unwrap();
        assert_eq!(back, r);
    }
}
