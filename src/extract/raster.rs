//! Raster images: text is read by the vision model.

use super::vision::{fit_within, transcription_elements, VisionReader};
use super::{DocumentFormat, Partitioner};
use crate::document::Element;
use crate::error::ExtractionError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub(crate) struct ImagePartitioner {
    format: DocumentFormat,
    vision: Option<Arc<VisionReader>>,
    max_px: u32,
    name: String,
}

impl ImagePartitioner {
    pub(crate) fn new(
        format: DocumentFormat,
        vision: Option<Arc<VisionReader>>,
        max_px: u32,
        name: &str,
    ) -> Self {
        Self {
            format,
            vision,
            max_px,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Partitioner for ImagePartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        let what = format!("image '{}'", self.name);
        let Some(vision) = self.vision.as_ref() else {
            return Err(ExtractionError::VisionUnavailable { what });
        };

        let format = self.format;
        let max_px = self.max_px;
        let image = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes)
                .map(|img| fit_within(img, max_px))
                .map_err(|e| ExtractionError::corrupt(format, e))
        })
        .await
        .map_err(|e| ExtractionError::Internal(format!("image decode task panicked: {e}")))??;

        let text = vision.read(&image, &what).await?;
        let elements = transcription_elements(&text);
        if elements.is_empty() {
            warn!("No text found in {}", what);
        }
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vision_is_checked_before_decoding() {
        let partitioner = ImagePartitioner::new(DocumentFormat::Jpeg, None, 2000, "photo.jpg");
        let err = partitioner
            .partition(Arc::from(b"\xFF\xD8\xFF not really a jpeg".to_vec()))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExtractionError::VisionUnavailable { ref what } if what == "image 'photo.jpg'"),
            "{err:?}"
        );
    }
}
