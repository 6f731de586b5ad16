use serde::{Deserialize, Serialize};

/// Result of a successful export: the archive plus a description of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub archive: Vec<u8>,
    pub metadata: ExportMetadata,
}

impl ExportResult {
    pub fn into_archive(self) -> Vec<u8> {
        self.archive
    }
}

/// Metadata describing one exported archive.
///
/// Serializable for a JSON sidecar next to the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub id: String,
    pub session_name: String,
    pub folder_name: String,
    pub cycles: u32,
    pub cps: f64,
    pub target_duration_secs: f64,
    pub captured_duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub wav_bytes: u64,
    /// SHA-256 of the `mix.wav` payload, lowercase hex.
    pub checksum: String,
    pub created_at: String,
}

/// Facts gathered while an export runs, turned into `ExportMetadata` at the end.
#[derive(Debug, Clone)]
pub(crate) struct CaptureFacts {
    pub session_name: String,
    pub folder_name: String,
    pub cycles: u32,
    pub cps: f64,
    pub target_duration_secs: f64,
    pub captured_duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl ExportMetadata {
    pub(crate) fn from_capture(facts: CaptureFacts, wav_bytes: u64, checksum: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_name: facts.session_name,
            folder_name: facts.folder_name,
            cycles: facts.cycles,
            cps: facts.cps,
            target_duration_secs: facts.target_duration_secs,
            captured_duration_secs: facts.captured_duration_secs,
            sample_rate: facts.sample_rate,
            channels: facts.channels,
            wav_bytes,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
