use serde::{Deserialize, Serialize};

pub const MAX_IMAGE_BYTES: u64 = 25 * 1024 * 1024;

const SUPPORTED_CONTENT_TYPES: &[&str] =
    &["image/png", "image/jpeg", "image/jpg", "image/webp", "image/gif"];
const SUPPORTED_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".gif"];

/// An attachment as observed on an incoming chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub url: String,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub size_bytes: Option<u64>,
}

/// The image descriptor kept on a draft once an attachment has been accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftImage {
    pub url: String,
    pub content_type: String,
    pub filename: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ImageRejection {
    NotAnImage,
    TooLarge { size_bytes: u64, max_bytes: u64 },
    Unreachable,
}

impl ImageRejection {
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAnImage => {
                "❌ That wasn't an image. Please send a PNG, JPEG, WebP, or GIF file.".to_owned()
            }
            Self::TooLarge { size_bytes, max_bytes } => format!(
                "❌ Image is too large ({:.2}MB). Maximum size is {}MB. Please compress or use a smaller image.",
                *size_bytes as f64 / 1024.0 / 1024.0,
                max_bytes / 1024 / 1024
            ),
            Self::Unreachable => {
                "❌ I couldn't load that image. Please try uploading it again.".to_owned()
            }
        }
    }
}

pub fn is_supported_image(attachment: &ImageAttachment) -> bool {
    let content_type = attachment.content_type.as_deref().unwrap_or_default().to_ascii_lowercase();
    if SUPPORTED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return true;
    }

    let filename = attachment.filename.as_deref().unwrap_or_default().to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|extension| filename.ends_with(extension))
}

pub fn first_image(attachments: &[ImageAttachment]) -> Option<&ImageAttachment> {
    attachments.iter().find(|attachment| is_supported_image(attachment))
}

/// Picks the first supported image and checks its size. Reachability is checked separately
/// by the storage collaborator.
pub fn accept_image(
    attachments: &[ImageAttachment],
    max_bytes: u64,
) -> Result<DraftImage, ImageRejection> {
    let attachment = first_image(attachments).ok_or(ImageRejection::NotAnImage)?;

    if let Some(size_bytes) = attachment.size_bytes {
        if size_bytes > max_bytes {
            return Err(ImageRejection::TooLarge { size_bytes, max_bytes });
        }
    }

    Ok(DraftImage {
        url: attachment.url.clone(),
        content_type: attachment.content_type.clone().unwrap_or_else(|| "image/png".to_owned()),
        filename: attachment.filename.clone().unwrap_or_else(|| "image.png".to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::{accept_image, is_supported_image, ImageAttachment, ImageRejection, MAX_IMAGE_BYTES};

    fn attachment(content_type: Option<&str>, filename: Option<&str>, size: u64) -> ImageAttachment {
        ImageAttachment {
            url: "https://cdn.example.test/a/file".to_owned(),
            content_type: content_type.map(str::to_owned),
            filename: filename.map(str::to_owned),
            size_bytes: Some(size),
        }
    }

    #[test]
    fn content_type_or_extension_marks_an_image() {
        assert!(is_supported_image(&attachment(Some("IMAGE/WEBP"), None, 10)));
        assert!(is_supported_image(&attachment(None, Some("Garden.JPEG"), 10)));
        assert!(is_supported_image(&attachment(Some("application/octet-stream"), Some("x.gif"), 10)));
        assert!(!is_supported_image(&attachment(Some("image/bmp"), Some("x.bmp"), 10)));
        assert!(!is_supported_image(&attachment(Some("text/plain"), Some("notes.txt"), 10)));
    }

    #[test]
    fn picks_first_image_and_fills_defaults() {
        let accepted = accept_image(
            &[attachment(Some("text/plain"), Some("notes.txt"), 10), attachment(None, Some("p.png"), 10)],
            MAX_IMAGE_BYTES,
        )
        .expect("second attachment is an image");

        assert_eq!(accepted.filename, "p.png");
        assert_eq!(accepted.content_type, "image/png");
    }

    #[test]
    fn rejects_oversized_images_with_readable_size() {
        let rejection = accept_image(
            &[attachment(Some("image/png"), Some("big.png"), MAX_IMAGE_BYTES + 1)],
            MAX_IMAGE_BYTES,
        )
        .expect_err("too large");

        assert!(matches!(rejection, ImageRejection::TooLarge { .. }));
        assert!(rejection.user_message().contains("25.00MB"));
        assert!(rejection.user_message().contains("Maximum size is 25MB"));
    }

    #[test]
    fn rejects_messages_without_images() {
        let rejection = accept_image(&[attachment(Some("text/plain"), Some("a.txt"), 1)], 100)
            .expect_err("no image");
        assert_eq!(rejection, ImageRejection::NotAnImage);
    }
}
