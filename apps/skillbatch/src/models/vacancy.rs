use serde::{Deserialize, Serialize};

/// One usable row from the vacancy source.
///
/// Built by the source reader and handed straight to the extraction client;
/// never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VacancyRecord {
    pub id: u64,
    pub raw_text: String,
    pub cleaned_text: String,
}
