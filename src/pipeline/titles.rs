use crate::database_ops::store::ClueStore;
use crate::normalization::title::TitleCleaner;
use anyhow::Result;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub id: i64,
    pub from: String,
    pub to: String,
}

/// Rewrites stored category titles that carry host commentary.
/// With `dry_run` the renames are only computed.
pub async fn clean_titles(store: &dyn ClueStore, dry_run: bool) -> Result<Vec<Rename>> {
    let cleaner = TitleCleaner::new()?;
    let mut renames = Vec::new();
    for (id, title) in store.category_titles().await? {
        let cleaned = cleaner.clean(&title);
        if cleaned == title {
            continue;
        }
        let rename = Rename {
            id,
            to: cleaned.into_owned(),
            from: title,
        };
        if !dry_run && !store.rename_category(id, &rename.to).await? {
            continue;
        }
        info!(id, from = %rename.from, to = %rename.to, dry_run, "category title cleaned");
        renames.push(rename);
    }
    Ok(renames)
}
