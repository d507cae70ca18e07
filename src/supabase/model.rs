use serde::{Deserialize, Serialize};

/// Body of a storage upload response.
#[derive(Deserialize, Debug)]
pub struct UploadResponse {
    #[serde(rename = "Key", alias = "key", default)]
    pub key: String,
}

/// Body of a storage delete request.
#[derive(Serialize, Debug)]
pub struct RemoveObjects {
    pub prefixes: Vec<String>,
}
