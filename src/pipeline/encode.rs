//! Part encoding: request content → `generateContent` JSON parts.
//!
//! Binary parts (the PDF, the prior-stage JSON) travel inline as base64 with
//! their MIME type; the API reads the PDF natively, so no rasterisation or
//! text extraction happens on our side.

use crate::service::Part;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

/// Encode one request part for the wire.
pub fn encode_part(part: &Part) -> Value {
    match part {
        Part::Inline { mime_type, data } => {
            let b64 = STANDARD.encode(data);
            debug!("Encoded {} part → {} bytes base64", mime_type, b64.len());
            json!({"inlineData": {"mimeType": mime_type, "data": b64}})
        }
        Part::Text(text) => json!({"text": text}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_pdf_part() {
        let bytes = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let v = encode_part(&Part::pdf(bytes.clone()));
        assert_eq!(v["inlineData"]["mimeType"], "application/pdf");
        let decoded = STANDARD
            .decode(v["inlineData"]["data"].as_str().unwrap())
            .expect("valid base64");
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn encode_text_part() {
        let v = encode_part(&Part::text("Analyze the following PDF"));
        assert_eq!(v, json!({"text": "Analyze the following PDF"}));
    }
}
