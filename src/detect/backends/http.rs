//! Hosted object-detection over HTTP.
//!
//! The frame is JPEG encoded, base64 encoded and posted to
//! `{api_url}/{model_id}?api_key=...`. The response carries a `predictions`
//! array whose entries are validated one by one.

use std::fmt;
use std::io::Cursor;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Deserialize;
use url::Url;

use crate::detect::backend::DetectionAdapter;
use crate::detect::result::{validate_predictions, RawDetection};
use crate::error::DetectionError;

const JPEG_QUALITY: u8 = 85;

/// Connection settings for the hosted detector. Injected at construction.
#[derive(Clone)]
pub struct HttpDetectorConfig {
    pub api_url: String,
    pub model_id: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl fmt::Debug for HttpDetectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDetectorConfig")
            .field("api_url", &self.api_url)
            .field("model_id", &self.model_id)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    predictions: Vec<serde_json::Value>,
}

pub struct HttpDetector {
    agent: ureq::Agent,
    endpoint: Url,
    model_id: String,
}

impl HttpDetector {
    pub fn new(config: HttpDetectorConfig) -> Result<Self, DetectionError> {
        let endpoint = build_endpoint(&config)?;
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            agent,
            endpoint,
            model_id: config.model_id,
        })
    }

    fn encode_frame(image: &RgbImage) -> Result<String, DetectionError> {
        let mut jpeg = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .encode_image(image)
            .map_err(|e| DetectionError::Encode(e.to_string()))?;
        Ok(STANDARD.encode(jpeg.into_inner()))
    }
}

impl DetectionAdapter for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    fn infer(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectionError> {
        let body = Self::encode_frame(image)?;

        let response = match self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/x-www-form-urlencoded")
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                return Err(DetectionError::Unavailable(format!(
                    "model {} returned HTTP {}: {}",
                    self.model_id,
                    code,
                    detail.trim()
                )));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(DetectionError::Unavailable(transport.to_string()));
            }
        };

        let raw = response
            .into_string()
            .map_err(|e| DetectionError::Unavailable(format!("read response body: {}", e)))?;
        parse_response(&raw)
    }
}

fn build_endpoint(config: &HttpDetectorConfig) -> Result<Url, DetectionError> {
    if config.model_id.trim().is_empty() {
        return Err(DetectionError::Unavailable("model id is empty".to_string()));
    }
    if config.api_key.trim().is_empty() {
        return Err(DetectionError::Unavailable("api key is empty".to_string()));
    }

    let mut endpoint = Url::parse(&config.api_url)
        .map_err(|e| DetectionError::Unavailable(format!("invalid api url: {}", e)))?;
    endpoint
        .path_segments_mut()
        .map_err(|_| DetectionError::Unavailable("api url cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(config.model_id.split('/').filter(|s| !s.is_empty()));
    endpoint
        .query_pairs_mut()
        .append_pair("api_key", &config.api_key);
    Ok(endpoint)
}

pub(crate) fn parse_response(raw: &str) -> Result<Vec<RawDetection>, DetectionError> {
    let parsed: InferenceResponse =
        serde_json::from_str(raw).map_err(|e| DetectionError::Malformed(e.to_string()))?;
    Ok(validate_predictions(parsed.predictions))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HttpDetectorConfig {
        HttpDetectorConfig {
            api_url: "https://detect.example.com".to_string(),
            model_id: "ppe-model/4".to_string(),
            api_key: "secret".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn endpoint_includes_model_and_key() {
        let endpoint = build_endpoint(&config()).unwrap();
        assert_eq!(
            endpoint.as_str(),
            "https://detect.example.com/ppe-model/4?api_key=secret"
        );
    }

    #[test]
    fn endpoint_rejects_missing_key() {
        let mut cfg = config();
        cfg.api_key = "  ".to_string();
        assert!(build_endpoint(&cfg).is_err());
    }

    #[test]
    fn debug_output_redacts_key() {
        let text = format!("{:?}", config());
        assert!(!text.contains("secret"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn parses_prediction_payload() {
        let raw = r#"{
            "time": 0.05,
            "image": {"width": 480, "height": 320},
            "predictions": [
                {"x": 200.0, "y": 150.0, "width": 80.0, "height": 200.0, "confidence": 0.93, "class": "Person", "class_id": 3},
                {"x": 205.0, "y": 70.0, "width": 30.0, "height": 25.0, "confidence": 0.81, "class": "Helmet", "class_id": 1}
            ]
        }"#;
        let detections = parse_response(raw).unwrap();
        assert_eq!(detections.len(), 2);
        assert!(detections[0].is_person());
        assert_eq!(detections[1].class_label, "Helmet");
    }

    #[test]
    fn missing_predictions_is_empty() {
        assert!(parse_response("{}").unwrap().is_empty());
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_response("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, DetectionError::Malformed(_)));
    }

    #[test]
    fn frame_encodes_to_base64_jpeg() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([10, 200, 30]));
        let encoded = HttpDetector::encode_frame(&image).unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
