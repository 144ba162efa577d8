use std::path::Path;

use siteops_core::RecordCategory;

use crate::cli::CategoryArg;
use crate::commands::common::{
    format_record_lines, open_outbox, record_to_list_item, RecordListItem,
};
use crate::error::CliError;

pub async fn run_queue(
    category: Option<CategoryArg>,
    pending_only: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let outbox = open_outbox(db_path).await?;
    let categories = category.map_or_else(
        || RecordCategory::SYNC_PRIORITY.to_vec(),
        |category| vec![category.into()],
    );

    let mut records = Vec::new();
    for category in categories {
        let batch = if pending_only {
            outbox.list_unsynced(category).await
        } else {
            outbox.list(category).await
        };
        records.extend(batch);
    }

    if as_json {
        let json_items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    for line in format_record_lines(&records) {
        println!("{line}");
    }
    Ok(())
}
