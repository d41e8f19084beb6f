//! services/api/src/adapters/ocr.rs
//!
//! A stand-in for a receipt OCR service. It implements the `ReceiptScanner`
//! port but ignores the image and always returns the same sample receipt.

use async_trait::async_trait;
use pantry_core::{PortResult, ReceiptLine, ReceiptScanner, ScannedReceipt};
use tracing::info;

const SAMPLE_LINES: &[(&str, &str)] = &[
    ("Whole Milk", "3.49"),
    ("Large Eggs", "4.29"),
    ("Sourdough Bread", "5.00"),
    ("Bananas", "1.19"),
    ("Chicken Breast", "8.75"),
    ("Basmati Rice", "6.99"),
    ("Paper Towels", "7.49"),
];

#[derive(Clone, Default)]
pub struct SampleReceiptScanner;

#[async_trait]
impl ReceiptScanner for SampleReceiptScanner {
    async fn process_receipt(&self, image: &[u8]) -> PortResult<ScannedReceipt> {
        info!(bytes = image.len(), "Running sample OCR on receipt image");
        Ok(ScannedReceipt {
            store: "Sample Grocery".to_string(),
            date: None,
            items: SAMPLE_LINES
                .iter()
                .map(|(name, price)| ReceiptLine {
                    name: name.to_string(),
                    price: price.to_string(),
                })
                .collect(),
        })
    }
}
