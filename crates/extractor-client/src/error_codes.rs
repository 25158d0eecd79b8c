//! Service error codes mapped to messages fit for end users.

/// Fallback shown when the service reports no code or an unknown one.
pub const UNKNOWN_ERROR: &str = "An unexpected error occurred. Please try again.";

/// Translates a service `errorCode` into a user-facing message.
pub fn user_message(code: Option<&str>) -> &'static str {
    match code {
        Some("INV-001") => "Invalid file type. Please upload PDF, PNG, JPG, or JPEG.",
        Some("INV-002") => "File too large. Maximum size is 10 MB.",
        Some("INV-003") => "File is empty or corrupted. Please try another file.",
        Some("INV-004") => "Failed to read the file. Please ensure the file is valid.",
        Some("INV-005") => {
            "OCR extraction failed. The file may be corrupted or the text may not be readable."
        }
        Some("INV-006") => "Processing timed out. Please try with a smaller file.",
        Some("INV-007") => {
            "Failed to extract invoice data. The document may not contain invoice information."
        }
        Some("INV-008") => "Failed to save invoice. Please try again.",
        Some("INV-009") => "Invoice not found.",
        Some("INV-010") => "Invalid invoice data. Please check the required fields.",
        Some("INV-011") => "Failed to update invoice. Please try again.",
        Some("INV-012") => "Failed to delete invoice. Please try again.",
        Some("INV-013") => "Database error. Please try again later.",
        Some("INV-014") => {
            "LLM extraction service is not available. Using fallback extraction method."
        }
        Some("INV-015") => "Extraction service temporarily unavailable. Please try again later.",
        Some("INV-016") => {
            "AI extraction service is temporarily unavailable. Using standard extraction."
        }
        Some("INV-017") => "Failed to process invoice with AI. Using fallback extraction.",
        Some("INV-018") => "Unable to parse AI extraction results. Using standard extraction.",
        Some("INV-019") => "AI returned invalid invoice data. Using fallback extraction.",
        Some("INV-020") => "OCR processing timed out. Please try with a smaller or clearer file.",
        _ => UNKNOWN_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_translate() {
        assert_eq!(
            user_message(Some("INV-009")),
            "Invoice not found."
        );
        assert_eq!(
            user_message(Some("INV-006")),
            "Processing timed out. Please try with a smaller file."
        );
    }

    #[test]
    fn missing_and_unknown_codes_fall_back() {
        assert_eq!(user_message(None), UNKNOWN_ERROR);
        assert_eq!(user_message(Some("INV-999")), UNKNOWN_ERROR);
        assert_eq!(user_message(Some("")), UNKNOWN_ERROR);
    }
}
