use std::fmt;

use crate::generation::LoadProgress;

/// User-visible status line
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    LoadingIndex { url: String },
    IndexLoaded { records: usize },
    LoadingModel(LoadProgress),
    Ready { model: String },
    Embedding,
    Searching,
    Generating { model: String },
    StillAnswering,
    Answered { passages: usize, millis: f64 },
    Error(String),
}

impl Status {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadingIndex { url } => write!(f, "Loading index from {url}…"),
            Self::IndexLoaded { records } => write!(f, "Index loaded ({records} passages)."),
            Self::LoadingModel(p) => match p.fraction {
                Some(fraction) => write!(
                    f,
                    "Loading model ({:.0}%): {}",
                    (fraction * 100.0).clamp(0.0, 100.0),
                    p.text
                ),
                None => write!(f, "Loading model: {}", p.text),
            },
            Self::Ready { model } => write!(f, "Ready. Using {model}."),
            Self::Embedding => f.write_str("Embedding question…"),
            Self::Searching => f.write_str("Searching passages…"),
            Self::Generating { model } => write!(f, "Generating answer with {model}…"),
            Self::StillAnswering => f.write_str("Still answering the previous question, please wait…"),
            Self::Answered { passages, millis } => {
                write!(f, "Done in {:.1}s ({passages} passages).", millis / 1000.0)
            }
            Self::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let status = Status::LoadingModel(LoadProgress {
            fraction: Some(0.43),
            text: "Fetching param cache".into(),
        });
        assert_eq!(status.to_string(), "Loading model (43%): Fetching param cache");

        let status = Status::LoadingModel(LoadProgress {
            fraction: None,
            text: "Compiling shaders".into(),
        });
        assert_eq!(status.to_string(), "Loading model: Compiling shaders");
    }

    #[test]
    fn test_answered_seconds() {
        let status = Status::Answered {
            passages: 5,
            millis: 2345.0,
        };
        assert_eq!(status.to_string(), "Done in 2.3s (5 passages).");
    }

    #[test]
    fn test_error_line() {
        let status = Status::Error("boom".into());
        assert!(status.is_error());
        assert_eq!(status.to_string(), "Error: boom");
    }
}
