//! Per-document translation pipeline.
//!
//! Runs synchronously to completion for one request: parse the upload, then
//! per page extract regions, translate them, and append the overlay that
//! masks originals and draws translations. A failure on any page aborts the
//! whole request; no partial document is ever returned.

use anyhow::{Result, anyhow};
use lopdf::Document;
use tracing::{debug, info};

use super::ServerState;
use crate::pdf::extract::TextExtractor;
use crate::pdf::reconstruct::{PageReconstructor, append_page_overlay};
use crate::pdf::{TextRegion, font};

pub(crate) async fn translate_document(
    state: &ServerState,
    bytes: &[u8],
    source: &str,
    target: &str,
) -> Result<Vec<u8>> {
    let mut doc =
        Document::load_mem(bytes).map_err(|err| anyhow!("PdfParseError: {}", err))?;

    let pages: Vec<_> = doc.get_pages().into_iter().collect();
    info!(pages = pages.len(), "processing document");

    // Extraction borrows the document immutably; gather all regions before
    // any page is mutated.
    let page_regions: Vec<Vec<TextRegion>> = {
        let extractor = TextExtractor::new(&doc, bytes, &state.font);
        pages
            .iter()
            .enumerate()
            .map(|(index, (_, page_id))| extractor.extract_page(*page_id, index))
            .collect()
    };

    let mut font_id = None;
    let mut total_regions = 0usize;
    let reconstructor = PageReconstructor::new(&state.font);

    for ((page_no, page_id), regions) in pages.iter().zip(page_regions) {
        if regions.is_empty() {
            debug!(page = *page_no, "no text found, passing page through");
            continue;
        }
        total_regions += regions.len();
        debug!(page = *page_no, regions = regions.len(), "translating page");

        let texts: Vec<String> = regions.iter().map(|region| region.text.clone()).collect();
        let translations = state.client.translate_batch(&texts, source, target).await;

        let font_ref = match font_id {
            Some(id) => id,
            None => {
                let id = font::embed_overlay_font(&mut doc, &state.font)
                    .map_err(|err| anyhow!("FontError: {}", err))?;
                font_id = Some(id);
                id
            }
        };
        font::register_page_font(&mut doc, *page_id, font::OVERLAY_FONT_NAME, font_ref)
            .map_err(|err| anyhow!("PageError: {}", err))?;

        let overlay = reconstructor.overlay_content(&regions, &translations);
        append_page_overlay(&mut doc, *page_id, &overlay)
            .map_err(|err| anyhow!("PageError: {}", err))?;
    }

    // Cosmetic cleanup of the streams we touched; no semantic effect.
    doc.compress();

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| anyhow!("PdfWriteError: {}", err))?;

    info!(
        regions = total_regions,
        output_kb = output.len() / 1024,
        "translation complete"
    );
    Ok(output)
}
