use std::path::Path;

use chrono::Local;
use siteops_core::util::non_blank;
use siteops_core::RecordPayload;

use crate::cli::{AttendanceArgs, CaptureCommands, DailyReportArgs, MaterialRequestArgs};
use crate::commands::common::{
    normalize_date, open_outbox, parse_material_item, parse_optional_timestamp,
};
use crate::error::CliError;

pub async fn run_capture(record: CaptureCommands, db_path: &Path) -> Result<(), CliError> {
    let (payload, captured_at) = build_payload(record)?;
    let category = payload.category();

    let outbox = open_outbox(db_path).await?;
    let id = match captured_at {
        Some(created_at) => outbox.enqueue_captured(payload, Some(created_at)).await?,
        None => outbox.enqueue(payload).await?,
    };

    println!("Queued {category} {id}");
    Ok(())
}

/// Build the payload plus an explicit capture time, when one was given.
pub fn build_payload(record: CaptureCommands) -> Result<(RecordPayload, Option<i64>), CliError> {
    match record {
        CaptureCommands::Attendance(args) => attendance_payload(args),
        CaptureCommands::DailyReport(args) => daily_report_payload(args),
        CaptureCommands::MaterialRequest(args) => material_request_payload(args),
    }
}

fn attendance_payload(args: AttendanceArgs) -> Result<(RecordPayload, Option<i64>), CliError> {
    let payload = RecordPayload::Attendance {
        worker_id: required_text(args.worker, "--worker")?,
        site_id: required_text(args.site, "--site")?,
        status: args.status.into(),
        check_in: parse_optional_timestamp(args.check_in.as_deref())?,
        check_out: parse_optional_timestamp(args.check_out.as_deref())?,
        note: non_blank(args.note),
    };
    Ok((payload, parse_optional_timestamp(args.captured_at.as_deref())?))
}

fn daily_report_payload(args: DailyReportArgs) -> Result<(RecordPayload, Option<i64>), CliError> {
    let summary = non_blank(Some(args.summary.join(" "))).ok_or(CliError::EmptySummary)?;
    let report_date = match args.date {
        Some(date) => normalize_date(&date)?,
        None => Local::now().date_naive().format("%Y-%m-%d").to_string(),
    };
    let issues = args
        .issues
        .into_iter()
        .filter_map(|issue| non_blank(Some(issue)))
        .collect();

    let payload = RecordPayload::DailyReport {
        site_id: required_text(args.site, "--site")?,
        report_date,
        summary,
        weather: non_blank(args.weather),
        workers_on_site: args.workers,
        issues,
    };
    Ok((payload, parse_optional_timestamp(args.captured_at.as_deref())?))
}

fn material_request_payload(
    args: MaterialRequestArgs,
) -> Result<(RecordPayload, Option<i64>), CliError> {
    let items = args
        .items
        .iter()
        .map(|item| parse_material_item(item))
        .collect::<Result<Vec<_>, _>>()?;
    let needed_by = args.needed_by.as_deref().map(normalize_date).transpose()?;

    let payload = RecordPayload::MaterialRequest {
        site_id: required_text(args.site, "--site")?,
        items,
        urgency: args.urgency.into(),
        needed_by,
        note: non_blank(args.note),
    };
    Ok((payload, parse_optional_timestamp(args.captured_at.as_deref())?))
}

fn required_text(value: String, flag: &str) -> Result<String, CliError> {
    non_blank(Some(value))
        .ok_or_else(|| CliError::InvalidArgument(format!("{flag} cannot be empty")))
}
