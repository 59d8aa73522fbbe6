use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::PipelineResult;

/// Save a pipeline result to file
pub async fn save_to_file(result: &PipelineResult, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(result, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print a pipeline result to the console
pub fn print_to_console(result: &PipelineResult, format: &OutputFormat) -> Result<()> {
    println!("{}", render(result, format)?);
    Ok(())
}

fn render(result: &PipelineResult, format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format_as_text(result),
        OutputFormat::Json => format_as_json(result)?,
        OutputFormat::Srt => format_as_srt(result),
    })
}

fn format_as_text(result: &PipelineResult) -> String {
    format!(
        "Title: {}\nAuthor: {}\n\n{}",
        result.title, result.author, result.transcript_text
    )
}

fn format_as_json(result: &PipelineResult) -> Result<String> {
    let value = serde_json::json!({
        "title": result.title,
        "author": result.author,
        "transcript": result.transcript_text,
        "segments": result.segments,
        "generated_at": chrono::Utc::now(),
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

fn format_as_srt(result: &PipelineResult) -> String {
    if result.segments.is_empty() {
        // No sentence offsets (e.g. description mode); one untimed cue
        return format!(
            "1\n{} --> {}\n{}\n",
            srt_timestamp(0),
            srt_timestamp(0),
            result.transcript_text
        );
    }

    let mut out = String::new();
    for (index, segment) in result.segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            srt_timestamp(segment.start_ms),
            srt_timestamp(segment.end_ms),
            segment.text
        ));
    }
    out
}

fn srt_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}
