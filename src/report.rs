use crate::attachment::RejectReason;
use crate::deliver::{BatchStatus, DeliveryOutcome, Verdict};

/// Render the outcome of a run as user-facing status lines: one per skipped
/// file, one per oversized singleton, one per failed or skipped message, and
/// a final overall verdict. Pure formatting, no I/O.
pub fn summarize(outcome: &DeliveryOutcome) -> Vec<String> {
    let mut lines = Vec::new();

    for rejection in &outcome.rejections {
        let mut line = format!(
            "File '{}' {} and won't be sent",
            rejection.path.display(),
            rejection.reason
        );
        if let Some(detail) = &rejection.detail {
            line.push_str(&format!(" ({})", detail));
        }
        lines.push(line);
    }

    let total = outcome.reports.len();
    for report in &outcome.reports {
        if report.oversized {
            lines.push(format!(
                "Warning: '{}' ({} bytes encoded) alone exceeds the message size limit; sent by itself as message {} of {}",
                report.filenames.first().map(String::as_str).unwrap_or("?"),
                report.encoded_size,
                report.index + 1,
                total
            ));
        }

        match &report.status {
            BatchStatus::Sent => {}
            BatchStatus::Failed(error) => {
                lines.push(format!(
                    "Message {} of {} ({}) failed: {}",
                    report.index + 1,
                    total,
                    describe_contents(&report.filenames),
                    error
                ));
            }
            BatchStatus::Skipped => {
                lines.push(format!(
                    "Message {} of {} ({}) not sent: cancelled",
                    report.index + 1,
                    total,
                    describe_contents(&report.filenames)
                ));
            }
        }
    }

    lines.push(match outcome.verdict() {
        Verdict::AllDelivered { total } => {
            format!("All {} message(s) sent successfully", total)
        }
        Verdict::Partial { sent, total } => {
            format!("Partially delivered: {} of {} message(s) sent", sent, total)
        }
        Verdict::Failed { .. } => "Delivery failed: no messages were sent".to_string(),
    });

    lines
}

fn describe_contents(filenames: &[String]) -> String {
    if filenames.is_empty() {
        "message body only".to_string()
    } else {
        format!("{} attachment(s): {}", filenames.len(), filenames.join(", "))
    }
}
