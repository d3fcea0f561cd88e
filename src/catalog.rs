/**
 * Model Catalog
 *
 * The fixed allow-list of downloadable artifacts per feature, with the
 * remote location and on-disk layout of each one.
 */

use serde::Serialize;

const WHISPER_BASE_URL: &str = "https://openaipublic.azureedge.net/main/whisper/models";
const HF_BASE_URL: &str = "https://huggingface.co/Helsinki-NLP";

/// Files making up one Opus-MT translation model, in download order.
pub const OPUS_MT_FILES: &[&str] = &[
    "config.json",
    "pytorch_model.bin",
    "source.spm",
    "target.spm",
    "tokenizer_config.json",
    "vocab.json",
];

/// Features that own downloadable artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Transcribe,
    Translate,
}

impl Feature {
    pub const ALL: [Feature; 2] = [Feature::Transcribe, Feature::Translate];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "transcribe" => Some(Self::Transcribe),
            "translate" => Some(Self::Translate),
            _ => None,
        }
    }

    /// Name used on the wire and in download keys
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
        }
    }

    /// Directory under the models dir holding this feature's artifacts
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Transcribe => "whisper",
            Self::Translate => "translate",
        }
    }
}

/// How an artifact is laid out on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLayout {
    /// `<feature dir>/<filename>`
    SingleFile { filename: String },
    /// `<feature dir>/<model>/<file>` for every file, fetched in order
    Directory { files: Vec<String> },
}

/// One remote file belonging to an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: String,
    /// Path relative to the feature directory
    pub relative_path: String,
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub feature: Feature,
    pub name: String,
    pub description: String,
    pub layout: ArtifactLayout,
    pub files: Vec<RemoteFile>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build the catalog. With a mirror every URL becomes
    /// `<mirror>/<feature dir>/<relative path>`.
    pub fn new(mirror_url: Option<&str>) -> Self {
        let mirror = mirror_url.map(|m| m.trim_end_matches('/').to_string());
        let mut entries = Vec::new();

        for (name, hash, description) in WHISPER_MODELS {
            let filename = format!("{}.pt", name);
            let upstream = format!("{}/{}/{}", WHISPER_BASE_URL, hash, upstream_whisper_file(name));
            entries.push(CatalogEntry {
                feature: Feature::Transcribe,
                name: name.to_string(),
                description: description.to_string(),
                files: vec![remote_file(mirror.as_deref(), Feature::Transcribe, upstream, filename.clone())],
                layout: ArtifactLayout::SingleFile { filename },
            });
        }

        for (name, description) in OPUS_MT_MODELS {
            let files = OPUS_MT_FILES
                .iter()
                .map(|file| {
                    let upstream = format!("{}/{}/resolve/main/{}", HF_BASE_URL, name, file);
                    remote_file(mirror.as_deref(), Feature::Translate, upstream, format!("{}/{}", name, file))
                })
                .collect();
            entries.push(CatalogEntry {
                feature: Feature::Translate,
                name: name.to_string(),
                description: description.to_string(),
                layout: ArtifactLayout::Directory {
                    files: OPUS_MT_FILES.iter().map(|f| f.to_string()).collect(),
                },
                files,
            });
        }

        Self { entries }
    }

    pub fn get(&self, feature: Feature, model: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.feature == feature && e.name == model)
    }

    /// Entries for one feature, in catalog order
    pub fn models(&self, feature: Feature) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(move |e| e.feature == feature)
    }
}

// (name, checkpoint hash, description)
const WHISPER_MODELS: [(&str, &str, &str); 3] = [
    (
        "small",
        "9ecf779972d90ba49c06d968637d720dd632c55bbf19d441fb42bf17a411e794",
        "Small, requires ~2GB RAM",
    ),
    (
        "medium",
        "345ae4da62f9b3d59415adc60127b97c714f32e89e936602e85993674d08dcb1",
        "Medium, requires ~5GB RAM",
    ),
    (
        "large",
        "81f7c96c852ee8fc832187b0132e569d6c3065a3252ed18e56effd0b6a73e524",
        "Large, requires ~10GB RAM",
    ),
];

const OPUS_MT_MODELS: [(&str, &str); 4] = [
    ("opus-mt-fr-en", "French to English"),
    ("opus-mt-de-en", "German to English"),
    ("opus-mt-es-en", "Spanish to English"),
    ("opus-mt-zh-en", "Chinese to English"),
];

// "large" is published as the large-v2 checkpoint
fn upstream_whisper_file(name: &str) -> String {
    match name {
        "large" => "large-v2.pt".to_string(),
        other => format!("{}.pt", other),
    }
}

fn remote_file(mirror: Option<&str>, feature: Feature, upstream: String, relative_path: String) -> RemoteFile {
    let url = match mirror {
        Some(base) => format!("{}/{}/{}", base, feature.dir_name(), relative_path),
        None => upstream,
    };
    RemoteFile { url, relative_path }
}
