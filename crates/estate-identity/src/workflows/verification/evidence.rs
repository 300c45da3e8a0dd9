use mime::Mime;

use super::domain::{DocumentSide, EvidenceRef};
use crate::config::EvidenceConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvidenceError {
    #[error("exactly two document images are required (front and back), found {found}")]
    WrongCount { found: usize },
    #[error("the {} side of the document was submitted more than once", .0.label())]
    DuplicateSide(DocumentSide),
    #[error("the {} image is missing its storage reference", .0.label())]
    MissingStorageKey(DocumentSide),
    #[error("the {} image has unsupported content type '{content_type}'", .side.label())]
    UnsupportedType {
        side: DocumentSide,
        content_type: String,
    },
    #[error("the {} image is empty", .0.label())]
    EmptyImage(DocumentSide),
    #[error("the {} image is {size} bytes, above the {max} byte limit", .side.label())]
    TooLarge {
        side: DocumentSide,
        size: u64,
        max: u64,
    },
}

/// Size and type rules for submitted document images.
#[derive(Debug, Clone)]
pub struct EvidencePolicy {
    max_image_bytes: u64,
    accepted: Vec<Mime>,
}

impl EvidencePolicy {
    pub fn new(max_image_bytes: u64) -> Self {
        let mut accepted = vec![mime::IMAGE_JPEG, mime::IMAGE_PNG];
        if let Ok(webp) = "image/webp".parse::<Mime>() {
            accepted.push(webp);
        }
        Self {
            max_image_bytes,
            accepted,
        }
    }

    pub fn validate(&self, evidence: &[EvidenceRef]) -> Result<(), EvidenceError> {
        if evidence.len() != 2 {
            return Err(EvidenceError::WrongCount {
                found: evidence.len(),
            });
        }
        if evidence[0].side == evidence[1].side {
            return Err(EvidenceError::DuplicateSide(evidence[0].side));
        }

        for image in evidence {
            self.validate_image(image)?;
        }
        Ok(())
    }

    fn validate_image(&self, image: &EvidenceRef) -> Result<(), EvidenceError> {
        if image.storage_key.trim().is_empty() {
            return Err(EvidenceError::MissingStorageKey(image.side));
        }

        let accepted = image
            .content_type
            .parse::<Mime>()
            .map(|parsed| {
                self.accepted
                    .iter()
                    .any(|allowed| allowed.essence_str() == parsed.essence_str())
            })
            .unwrap_or(false);
        if !accepted {
            return Err(EvidenceError::UnsupportedType {
                side: image.side,
                content_type: image.content_type.clone(),
            });
        }

        if image.size_bytes == 0 {
            return Err(EvidenceError::EmptyImage(image.side));
        }
        if image.size_bytes > self.max_image_bytes {
            return Err(EvidenceError::TooLarge {
                side: image.side,
                size: image.size_bytes,
                max: self.max_image_bytes,
            });
        }
        Ok(())
    }
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self::from(&EvidenceConfig::default())
    }
}

impl From<&EvidenceConfig> for EvidencePolicy {
    fn from(config: &EvidenceConfig) -> Self {
        Self::new(config.max_image_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(side: DocumentSide, content_type: &str, size_bytes: u64) -> EvidenceRef {
        EvidenceRef {
            side,
            storage_key: format!("kyc/u-1/{}.jpg", side.label()),
            content_type: content_type.to_string(),
            size_bytes,
        }
    }

    fn policy() -> EvidencePolicy {
        EvidencePolicy::new(1_000)
    }

    #[test]
    fn accepts_front_and_back_images() {
        let evidence = [
            image(DocumentSide::Front, "image/jpeg", 900),
            image(DocumentSide::Back, "image/png; charset=binary", 10),
        ];
        assert_eq!(policy().validate(&evidence), Ok(()));
    }

    #[test]
    fn requires_exactly_two_images() {
        let evidence = [image(DocumentSide::Front, "image/jpeg", 10)];
        assert_eq!(
            policy().validate(&evidence),
            Err(EvidenceError::WrongCount { found: 1 })
        );
    }

    #[test]
    fn rejects_two_fronts() {
        let evidence = [
            image(DocumentSide::Front, "image/jpeg", 10),
            image(DocumentSide::Front, "image/jpeg", 10),
        ];
        assert_eq!(
            policy().validate(&evidence),
            Err(EvidenceError::DuplicateSide(DocumentSide::Front))
        );
    }

    #[test]
    fn rejects_non_image_types() {
        let evidence = [
            image(DocumentSide::Front, "application/pdf", 10),
            image(DocumentSide::Back, "image/jpeg", 10),
        ];
        assert!(matches!(
            policy().validate(&evidence),
            Err(EvidenceError::UnsupportedType { side: DocumentSide::Front, .. })
        ));
    }

    #[test]
    fn rejects_oversized_images() {
        let evidence = [
            image(DocumentSide::Front, "image/webp", 10),
            image(DocumentSide::Back, "image/jpeg", 1_001),
        ];
        assert_eq!(
            policy().validate(&evidence),
            Err(EvidenceError::TooLarge {
                side: DocumentSide::Back,
                size: 1_001,
                max: 1_000,
            })
        );
    }

    #[test]
    fn rejects_blank_storage_keys() {
        let mut back = image(DocumentSide::Back, "image/jpeg", 10);
        back.storage_key = "  ".to_string();
        let evidence = [image(DocumentSide::Front, "image/jpeg", 10), back];
        assert_eq!(
            policy().validate(&evidence),
            Err(EvidenceError::MissingStorageKey(DocumentSide::Back))
        );
    }
}
