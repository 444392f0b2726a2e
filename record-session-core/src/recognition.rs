//! Description of a request to the remote song-recognition service.
//!
//! Data only: this module renders the query items such a request carries but
//! never talks to the network.

use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Base URL of the recognition service.
pub const API_BASE_URL: &str = "https://api.audd.io";

/// Where the audio to recognize comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceRef {
    RemoteUrl(String),
    LocalFile(PathBuf),
    /// Audio the service already holds, by id.
    Cache { uid: String },
}

/// Recognition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMethod {
    /// Match against the original studio recording.
    ByOriginalSong,
    /// Match a user's own rendition (humming, singing).
    ByUserReproduce,
}

impl RecognitionMethod {
    pub fn api_name(self) -> &'static str {
        match self {
            Self::ByOriginalSong => "audd.api.recognize",
            Self::ByUserReproduce => "audd.api.recognizeWithOffset",
        }
    }
}

/// Bit set of result categories to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultTypes(u8);

impl ResultTypes {
    pub const NONE: Self = Self(0);
    pub const ITUNES: Self = Self(1 << 0);
    pub const VK: Self = Self(1 << 1);
    pub const LYRICS: Self = Self(1 << 2);
    pub const ALL: Self = Self(Self::ITUNES.0 | Self::VK.0 | Self::LYRICS.0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Flag-style query item names, in a fixed order.
    pub fn query_item_names(self) -> Vec<&'static str> {
        [
            (Self::ITUNES, "return_itunes_audios"),
            (Self::VK, "return_vk_audios"),
            (Self::LYRICS, "return_lyrics"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl Default for ResultTypes {
    fn default() -> Self {
        Self::ITUNES
    }
}

impl BitOr for ResultTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResultTypes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A single `name[=value]` query item.
pub type QueryItem = (String, Option<String>);

/// A song-recognition request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionRequest {
    pub source: AudioSourceRef,
    pub result_types: ResultTypes,
    pub method: Option<RecognitionMethod>,
    /// Format hint for the uploaded audio, e.g. `"wav"`.
    pub format: Option<String>,
    pub uid: Option<String>,
}

impl RecognitionRequest {
    pub fn new(source: AudioSourceRef) -> Self {
        Self {
            source,
            result_types: ResultTypes::default(),
            method: None,
            format: None,
            uid: None,
        }
    }

    /// Request for a finished local recording, hinting its format from the
    /// file extension.
    pub fn for_recording(path: &Path) -> Self {
        let mut request = Self::new(AudioSourceRef::LocalFile(path.to_path_buf()));
        request.format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_owned);
        request
    }

    /// Query items in the order the service expects them, ending with the
    /// API token.
    pub fn query_items(&self, api_token: &str) -> Vec<QueryItem> {
        let mut items = Vec::new();
        if let Some(method) = self.method {
            items.push(("method".to_owned(), Some(method.api_name().to_owned())));
        }
        if let Some(format) = &self.format {
            items.push(("audio_format".to_owned(), Some(format.clone())));
        }
        items.extend(
            self.result_types
                .query_item_names()
                .into_iter()
                .map(|name| (name.to_owned(), None)),
        );
        items.push(("api_token".to_owned(), Some(api_token.to_owned())));
        items
    }
}

/// Client identifier derived from a persisted per-user id.
pub fn client_uid(user_id: &str) -> String {
    format!("com.vladlex.AudD.u{{{user_id}}}")
}
