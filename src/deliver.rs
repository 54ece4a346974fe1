use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

use crate::attachment::Rejection;
use crate::batch::Batch;
use crate::config::{Config, SmtpSecurity};

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("SMTP authentication failed: {0}")]
    Auth(String),

    #[error("SMTP connection failed: {0}")]
    Connect(String),

    #[error("SMTP send failed: {0}")]
    Send(String),

    #[error("Invalid email address: {0}")]
    Address(String),
}

/// The fixed parts of the outgoing message, identical for every batch.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Transport collaborator: accepts one fully-formed message and either
/// confirms delivery or fails. The dispatcher treats it as opaque and
/// synchronous.
pub trait Mailer {
    fn send_one(&mut self, envelope: &Envelope, batch: &Batch) -> Result<(), MailerError>;
}

/// SMTP-backed `Mailer`. One session for the whole run: `connect` verifies
/// the endpoint and credentials up front, so no batch is ever attempted
/// against a dead or misauthenticated server.
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn connect(config: &Config, password: &str) -> Result<Self, MailerError> {
        let sender = parse_mailbox(&config.sender_email)?;

        let creds = Credentials::new(config.smtp_username.clone(), password.to_string());

        let transport = match config.smtp_security {
            SmtpSecurity::SSL => {
                let tls_params = TlsParameters::new(config.smtp_server.clone())
                    .map_err(|e| MailerError::Connect(e.to_string()))?;

                SmtpTransport::relay(&config.smtp_server)
                    .map_err(|e| MailerError::Connect(e.to_string()))?
                    .credentials(creds)
                    .port(config.smtp_port)
                    .tls(Tls::Wrapper(tls_params))
                    .build()
            }
            SmtpSecurity::StartTLS => {
                let tls_params = TlsParameters::new(config.smtp_server.clone())
                    .map_err(|e| MailerError::Connect(e.to_string()))?;

                SmtpTransport::relay(&config.smtp_server)
                    .map_err(|e| MailerError::Connect(e.to_string()))?
                    .credentials(creds)
                    .port(config.smtp_port)
                    .tls(Tls::Required(tls_params))
                    .build()
            }
            SmtpSecurity::None => SmtpTransport::relay(&config.smtp_server)
                .map_err(|e| MailerError::Connect(e.to_string()))?
                .credentials(creds)
                .port(config.smtp_port)
                .tls(Tls::None)
                .build(),
        };

        match transport.test_connection() {
            Ok(true) => {}
            Ok(false) => {
                return Err(MailerError::Connect("SMTP connection test failed".to_string()))
            }
            // A permanent rejection during session setup is the server
            // refusing our credentials
            Err(e) if e.is_permanent() => return Err(MailerError::Auth(e.to_string())),
            Err(e) => return Err(MailerError::Connect(e.to_string())),
        }

        log::debug!("SMTP session established with {}", config.smtp_server);
        Ok(Self { transport, sender })
    }
}

impl Mailer for SmtpMailer {
    fn send_one(&mut self, envelope: &Envelope, batch: &Batch) -> Result<(), MailerError> {
        let recipient = parse_mailbox(&envelope.recipient)?;

        let message_builder = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(&envelope.subject);

        let body_part = MultiPart::alternative()
            .singlepart(SinglePart::plain(envelope.body.clone()));

        let final_multipart = if batch.is_empty() {
            // No attachments, just use the body
            body_part
        } else {
            let mut mixed_part = MultiPart::mixed().multipart(body_part);

            for attachment in &batch.attachments {
                let attachment_part = MimeAttachment::new(attachment.filename.clone()).body(
                    attachment.data.clone(),
                    attachment
                        .content_type
                        .parse()
                        .unwrap_or_else(|_| ContentType::parse("application/octet-stream").unwrap()),
                );
                mixed_part = mixed_part.singlepart(attachment_part);
            }

            mixed_part
        };

        let message = message_builder
            .multipart(final_multipart)
            .map_err(|e| MailerError::Send(e.to_string()))?;

        self.transport
            .send(&message)
            .map_err(|e| MailerError::Send(e.to_string()))?;

        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailerError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| MailerError::Address(format!("{}: {}", address, e)))
}

/// Cooperative cancellation for long batch sequences. Checked before every
/// send and while pacing, so a cancelled run stops within one sleep slice.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub enum BatchStatus {
    Sent,
    Failed(MailerError),
    /// Not attempted because the run was cancelled first.
    Skipped,
}

/// What happened to one batch, with enough identity that the summary can say
/// exactly which files reached the recipient.
#[derive(Debug)]
pub struct BatchReport {
    pub index: usize,
    pub filenames: Vec<String>,
    pub encoded_size: u64,
    pub oversized: bool,
    pub status: BatchStatus,
}

impl BatchReport {
    fn new(index: usize, batch: &Batch, status: BatchStatus) -> Self {
        Self {
            index,
            filenames: batch.attachments.iter().map(|a| a.filename.clone()).collect(),
            encoded_size: batch.encoded_size,
            oversized: batch.oversized_singleton,
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    AllDelivered { total: usize },
    Partial { sent: usize, total: usize },
    Failed { total: usize },
}

#[derive(Debug)]
pub struct DeliveryOutcome {
    pub reports: Vec<BatchReport>,
    pub rejections: Vec<Rejection>,
}

impl DeliveryOutcome {
    pub fn verdict(&self) -> Verdict {
        let total = self.reports.len();
        let sent = self
            .reports
            .iter()
            .filter(|r| matches!(r.status, BatchStatus::Sent))
            .count();

        if sent == total {
            Verdict::AllDelivered { total }
        } else if sent == 0 {
            Verdict::Failed { total }
        } else {
            Verdict::Partial { sent, total }
        }
    }
}

const PACE_SLICE: Duration = Duration::from_millis(50);

/// Drives the batches through the transport in order. One failed send never
/// aborts the rest; each batch is attempted and reported independently.
pub struct Dispatcher {
    pacing: Duration,
    cancel: CancelToken,
}

impl Dispatcher {
    pub fn new(pacing: Duration, cancel: CancelToken) -> Self {
        Self { pacing, cancel }
    }

    pub fn deliver(
        &self,
        envelope: &Envelope,
        batches: Vec<Batch>,
        rejections: Vec<Rejection>,
        mailer: &mut dyn Mailer,
    ) -> DeliveryOutcome {
        let total = batches.len();
        let mut reports = Vec::with_capacity(total);

        for (index, batch) in batches.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!("Cancelled; message {} of {} not attempted", index + 1, total);
                reports.push(BatchReport::new(index, &batch, BatchStatus::Skipped));
                continue;
            }

            let status = match mailer.send_one(envelope, &batch) {
                Ok(()) => {
                    log::info!(
                        "Message {} of {} sent ({} attachment(s), {} bytes encoded)",
                        index + 1,
                        total,
                        batch.count(),
                        batch.encoded_size
                    );
                    BatchStatus::Sent
                }
                Err(e) => {
                    log::error!("Message {} of {} failed: {}", index + 1, total, e);
                    BatchStatus::Failed(e)
                }
            };
            reports.push(BatchReport::new(index, &batch, status));

            // Rate-limit pause between messages, never after the last one
            if index + 1 < total {
                self.pace();
            }
        }

        DeliveryOutcome { reports, rejections }
    }

    fn pace(&self) {
        let mut remaining = self.pacing;
        while !remaining.is_zero() {
            if self.cancel.is_cancelled() {
                return;
            }
            let step = remaining.min(PACE_SLICE);
            thread::sleep(step);
            remaining -= step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Attachment;
    use std::path::PathBuf;
    use std::time::Instant;

    fn att(name: &str, encoded_size: u64) -> Attachment {
        Attachment {
            path: PathBuf::from(name),
            filename: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            data: Vec::new(),
            raw_size: encoded_size,
            encoded_size,
        }
    }

    fn batch(names: &[&str]) -> Batch {
        let mut b = Batch::default();
        for name in names {
            b.encoded_size += 10;
            b.attachments.push(att(name, 10));
        }
        b
    }

    fn envelope() -> Envelope {
        Envelope {
            sender: "sender@example.com".to_string(),
            recipient: "recipient@example.com".to_string(),
            subject: "subject".to_string(),
            body: "body".to_string(),
        }
    }

    /// Scripted transport: fails the call indices in `fail_on`, optionally
    /// cancels the token after a given call.
    struct FakeMailer {
        fail_on: Vec<usize>,
        cancel_after: Option<(usize, CancelToken)>,
        calls: Vec<usize>,
    }

    impl FakeMailer {
        fn new(fail_on: Vec<usize>) -> Self {
            Self { fail_on, cancel_after: None, calls: Vec::new() }
        }
    }

    impl Mailer for FakeMailer {
        fn send_one(&mut self, _envelope: &Envelope, batch: &Batch) -> Result<(), MailerError> {
            let call = self.calls.len();
            self.calls.push(batch.count());

            if let Some((after, token)) = &self.cancel_after {
                if call == *after {
                    token.cancel();
                }
            }

            if self.fail_on.contains(&call) {
                Err(MailerError::Send("simulated transport failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn dispatcher(pacing: Duration) -> Dispatcher {
        Dispatcher::new(pacing, CancelToken::new())
    }

    #[test]
    fn test_one_failed_batch_does_not_abort_the_rest() {
        let mut mailer = FakeMailer::new(vec![1]);
        let batches = vec![batch(&["a"]), batch(&["b"]), batch(&["c"])];

        let outcome =
            dispatcher(Duration::ZERO).deliver(&envelope(), batches, Vec::new(), &mut mailer);

        assert_eq!(mailer.calls.len(), 3);
        assert!(matches!(outcome.reports[0].status, BatchStatus::Sent));
        assert!(matches!(outcome.reports[1].status, BatchStatus::Failed(_)));
        assert!(matches!(outcome.reports[2].status, BatchStatus::Sent));
        assert_eq!(outcome.verdict(), Verdict::Partial { sent: 2, total: 3 });
    }

    #[test]
    fn test_empty_batch_sends_exactly_one_body_only_message() {
        let mut mailer = FakeMailer::new(Vec::new());
        let batches = vec![Batch::default()];

        let start = Instant::now();
        let outcome = dispatcher(Duration::from_millis(200)).deliver(
            &envelope(),
            batches,
            Vec::new(),
            &mut mailer,
        );

        assert_eq!(mailer.calls, vec![0]);
        assert_eq!(outcome.verdict(), Verdict::AllDelivered { total: 1 });
        // A single message is never paced
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_pacing_runs_between_messages() {
        let mut mailer = FakeMailer::new(Vec::new());
        let batches = vec![batch(&["a"]), batch(&["b"])];

        let start = Instant::now();
        dispatcher(Duration::from_millis(60)).deliver(&envelope(), batches, Vec::new(), &mut mailer);

        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_cancellation_skips_remaining_batches() {
        let cancel = CancelToken::new();
        let mut mailer = FakeMailer::new(Vec::new());
        mailer.cancel_after = Some((0, cancel.clone()));
        let batches = vec![batch(&["a"]), batch(&["b"]), batch(&["c"])];

        let outcome = Dispatcher::new(Duration::ZERO, cancel).deliver(
            &envelope(),
            batches,
            Vec::new(),
            &mut mailer,
        );

        assert_eq!(mailer.calls.len(), 1);
        assert!(matches!(outcome.reports[0].status, BatchStatus::Sent));
        assert!(matches!(outcome.reports[1].status, BatchStatus::Skipped));
        assert!(matches!(outcome.reports[2].status, BatchStatus::Skipped));
        assert_eq!(outcome.verdict(), Verdict::Partial { sent: 1, total: 3 });
    }

    #[test]
    fn test_every_send_failing_is_an_overall_failure() {
        let mut mailer = FakeMailer::new(vec![0, 1]);
        let batches = vec![batch(&["a"]), batch(&["b"])];

        let outcome =
            dispatcher(Duration::ZERO).deliver(&envelope(), batches, Vec::new(), &mut mailer);

        assert_eq!(outcome.verdict(), Verdict::Failed { total: 2 });
    }

    #[test]
    fn test_oversized_flag_and_filenames_survive_into_the_report() {
        let mut mailer = FakeMailer::new(Vec::new());
        let mut oversized = batch(&["huge.bin"]);
        oversized.oversized_singleton = true;

        let outcome = dispatcher(Duration::ZERO).deliver(
            &envelope(),
            vec![oversized],
            Vec::new(),
            &mut mailer,
        );

        assert!(outcome.reports[0].oversized);
        assert_eq!(outcome.reports[0].filenames, vec!["huge.bin".to_string()]);
        assert!(matches!(outcome.reports[0].status, BatchStatus::Sent));
    }
}
