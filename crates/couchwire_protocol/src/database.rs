//! Database metadata returned by `GET /{db}`.

use serde::{Deserialize, Serialize};

/// Ever-changing metadata about a single database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMeta {
    /// Database name.
    #[serde(rename = "db_name")]
    pub name: String,
    /// Number of live documents.
    #[serde(rename = "doc_count", default)]
    pub document_count: u64,
    /// Number of deleted documents.
    #[serde(rename = "doc_del_count", default)]
    pub document_deletion_count: u64,
    /// Current update sequence.
    #[serde(rename = "update_seq", default)]
    pub update_sequence_number: u64,
    /// Current purge sequence.
    #[serde(rename = "purge_seq", default)]
    pub purge_sequence_number: u64,
    /// Whether compaction is running.
    #[serde(default)]
    pub compact_running: bool,
    /// Size of the database file on disk, in bytes.
    #[serde(default)]
    pub disk_size: u64,
    /// Size of live data, in bytes.
    #[serde(default)]
    pub data_size: u64,
    /// Instance start time.
    #[serde(default)]
    pub instance_start_time: String,
    /// On-disk format version.
    #[serde(default)]
    pub disk_format_version: u32,
    /// Sequence committed to disk.
    #[serde(rename = "committed_update_seq", default)]
    pub committed_update_sequence_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_payload() {
        let body = r#"{
            "db_name": "playground",
            "doc_count": 3,
            "doc_del_count": 1,
            "update_seq": 4,
            "purge_seq": 0,
            "compact_running": false,
            "disk_size": 16473,
            "data_size": 1024,
            "instance_start_time": "1495645126000000",
            "disk_format_version": 6,
            "committed_update_seq": 4
        }"#;
        let meta: DatabaseMeta = serde_json::from_str(body).unwrap();
        assert_eq!(meta.name, "playground");
        assert_eq!(meta.document_count, 3);
        assert_eq!(meta.document_deletion_count, 1);
        assert_eq!(meta.update_sequence_number, 4);
        assert_eq!(meta.disk_format_version, 6);
        assert_eq!(meta.committed_update_sequence_number, 4);
    }

    #[test]
    fn missing_fields_default() {
        let meta: DatabaseMeta = serde_json::from_str(r#"{"db_name":"t1"}"#).unwrap();
        assert_eq!(meta.document_count, 0);
        assert!(meta.instance_start_time.is_empty());
    }
}
