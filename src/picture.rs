//! One gathered picture and where its pixels currently live.

/// Which store holds a picture's `final_path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureLocation {
    Source,
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// Path in the source store, as enumerated.
    pub source_path: String,
    /// Path of the pixels to lay out; differs from `source_path` after a process step.
    pub final_path: String,
    pub caption: String,
    pub long_text: String,
    pub location: PictureLocation,
    /// Set when `final_path` is a temp artifact that must be cleaned up.
    pub temp_artifact: Option<String>,
}

impl Picture {
    pub fn new(source_path: impl Into<String>) -> Self {
        let source_path = source_path.into();
        Self {
            final_path: source_path.clone(),
            source_path,
            caption: String::new(),
            long_text: String::new(),
            location: PictureLocation::Source,
            temp_artifact: None,
        }
    }

    /// Point the picture at an artifact in the temporary store.
    pub fn relocate(&mut self, artifact: String) {
        self.final_path = artifact.clone();
        self.location = PictureLocation::Temporary;
        self.temp_artifact = Some(artifact);
    }

    pub fn has_long_text(&self) -> bool {
        !self.long_text.trim().is_empty()
    }
}
