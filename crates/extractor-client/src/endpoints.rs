//! Route fragments for the extraction service API.

pub const EXTRACTIONS: &str = "/api/v1.0/extractions";
pub const INVOICES: &str = "/api/v1.0/invoices";

/// Path for the status of a single extraction job.
pub fn extraction_by_key(job_key: &str) -> String {
    format!("{EXTRACTIONS}/{job_key}")
}

/// Path for a stored invoice record.
pub fn invoice_by_key(record_key: &str) -> String {
    format!("{INVOICES}/{record_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_embed_the_key() {
        assert_eq!(
            extraction_by_key("ext-42"),
            "/api/v1.0/extractions/ext-42"
        );
        assert_eq!(invoice_by_key("inv-7"), "/api/v1.0/invoices/inv-7");
    }
}
