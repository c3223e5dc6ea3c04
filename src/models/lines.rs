use serde::{Deserialize, Serialize};

/// One subtitle line as submitted by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleLine {
    pub index: u32,
    pub text: String,
}

/// One translated line as reported by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedLine {
    pub index: u32,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub translated: String,
}
