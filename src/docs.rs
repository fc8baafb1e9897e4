//! Published documents: full-text search, the document viewer, and the
//! fragment view that evidence cards link to.

use anyhow::{Context, Result};

use crate::api::ApiClient;
use crate::config::Config;
use crate::render::{self, Style};

/// `kbd search <q>`
pub async fn run_search(
    config: &Config,
    client: &ApiClient,
    query: &str,
    limit: Option<u32>,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("search query must not be empty");
    }
    let style = Style::new();
    let limit = limit.unwrap_or(config.history.limit).clamp(1, 100);
    let hits = client
        .search(query, limit)
        .await
        .with_context(|| format!("Search for '{query}' failed"))?;
    tracing::debug!(query, hits = hits.len(), "search done");
    print!("{}", render::search_hits(&hits, &style));
    Ok(())
}

/// `kbd doc [<doc_id> | <link>] [--chunk <chunk_id>]`
///
/// Without a target the published documents are listed. The target is a
/// numeric id or an evidence card's `/doc/{doc_id}?chunk={chunk_id}` link.
/// With a chunk the fragment is shown between its neighbours; `--chunk`
/// wins over the one in the link.
pub async fn run_doc(
    client: &ApiClient,
    target: Option<&str>,
    chunk_id: Option<i64>,
) -> Result<()> {
    let style = Style::new();
    let Some(target) = target else {
        let docs = client
            .documents()
            .await
            .context("Failed to list documents")?;
        print!("{}", render::documents(&docs, &style));
        return Ok(());
    };
    let (doc_id, link_chunk) = parse_doc_target(target)
        .with_context(|| format!("'{target}' is neither a document id nor a /doc/ link"))?;

    match chunk_id.or(link_chunk) {
        Some(chunk_id) => {
            let chunk = client
                .document_chunk(doc_id, chunk_id)
                .await
                .with_context(|| format!("Failed to load fragment {chunk_id} of document {doc_id}"))?;
            print!("{}", render::document_chunk(&chunk, &style));
        }
        None => {
            let doc = client
                .document(doc_id)
                .await
                .with_context(|| format!("Failed to load document {doc_id}"))?;
            print!("{}", render::document(&doc, &style));
        }
    }
    Ok(())
}

/// Accept either a bare document id or a deep link.
pub fn parse_doc_target(target: &str) -> Option<(i64, Option<i64>)> {
    match target.trim().parse() {
        Ok(doc_id) => Some((doc_id, None)),
        Err(_) => parse_deep_link(target),
    }
}

/// Parse a `/doc/{doc_id}?chunk={chunk_id}` link back into ids.
pub fn parse_deep_link(link: &str) -> Option<(i64, Option<i64>)> {
    let rest = link.trim().strip_prefix("/doc/")?;
    let (doc, query) = match rest.split_once('?') {
        Some((doc, query)) => (doc, Some(query)),
        None => (rest, None),
    };
    let doc_id = doc.parse().ok()?;
    let chunk_id = match query {
        Some(query) => Some(
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("chunk="))?
                .parse()
                .ok()?,
        ),
        None => None,
    };
    Some((doc_id, chunk_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbdesk_core::models::EvidenceSource;

    #[test]
    fn test_deep_link_round_trip() {
        let source = EvidenceSource {
            source_no: 1,
            doc_id: 12,
            title: None,
            chunk_id: 345,
            snippet: String::new(),
        };
        assert_eq!(parse_deep_link(&source.deep_link()), Some((12, Some(345))));
    }

    #[test]
    fn test_doc_target_id_or_link() {
        assert_eq!(parse_doc_target("12"), Some((12, None)));
        assert_eq!(parse_doc_target(" /doc/12?chunk=345 "), Some((12, Some(345))));
        assert_eq!(parse_doc_target("twelve"), None);
    }

    #[test]
    fn test_deep_link_variants() {
        assert_eq!(parse_deep_link("/doc/7"), Some((7, None)));
        assert_eq!(parse_deep_link("/doc/7?x=1&chunk=9"), Some((7, Some(9))));
        assert_eq!(parse_deep_link("/doc/abc"), None);
        assert_eq!(parse_deep_link("/doc/7?x=1"), None);
        assert_eq!(parse_deep_link("/history/7"), None);
    }
}
