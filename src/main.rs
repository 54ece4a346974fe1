use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::error;

use sendit::attachment::{admit, Admission, TransferEncoding};
use sendit::batch::{pack, BatchLimits};
use sendit::collect::collect_files;
use sendit::config::Config;
use sendit::credentials::SecureCredentials;
use sendit::deliver::{CancelToken, Dispatcher, Envelope, SmtpMailer, Verdict};
use sendit::report::summarize;

/// Send a message over SMTP, batching a directory of attachments across as
/// few size-valid emails as necessary
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to config file
    #[clap(short, long, default_value = "~/.config/sendit/config.json")]
    config: String,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a message with the files under a directory attached
    Send {
        /// Subject line
        #[clap(short, long)]
        subject: String,

        /// Message body text
        #[clap(short, long)]
        body: String,

        /// Directory whose files are attached, recursively
        #[clap(short = 'p', long)]
        directory: String,

        /// Recipient email address
        #[clap(short, long)]
        recipient: String,

        /// Send the message text only, without attachments
        #[clap(long)]
        no_attachments: bool,
    },

    /// Send a text-only message
    SendText {
        /// Subject line
        #[clap(short, long)]
        subject: String,

        /// Message body text
        #[clap(short, long)]
        body: String,

        /// Ignored; accepted for parity with `send`
        #[clap(short = 'p', long)]
        directory: Option<String>,

        /// Recipient email address
        #[clap(short, long)]
        recipient: String,
    },

    /// Write a default config file to edit
    InitConfig,
}

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    env_logger::Builder::new()
        .filter_level(if args.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("Error: {:?}", err);
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let config_path = shellexpand::tilde(&args.config).into_owned();

    match args.command {
        Commands::InitConfig => {
            if Path::new(&config_path).exists() {
                println!("Config already exists at {}", config_path);
                return Ok(0);
            }
            Config::default()
                .save(&config_path)
                .context("Failed to write default config")?;
            println!("Wrote default config to {}", config_path);
            println!("Edit it with your SMTP settings before sending.");
            Ok(0)
        }
        Commands::Send { subject, body, directory, recipient, no_attachments } => run_send(
            &config_path,
            subject,
            body,
            recipient,
            (!no_attachments).then_some(directory),
        ),
        Commands::SendText { subject, body, directory: _, recipient } => {
            run_send(&config_path, subject, body, recipient, None)
        }
    }
}

/// The whole delivery pipeline: collect, admit, pack, connect, dispatch,
/// summarize. `attachment_dir` is `None` on the text-only path.
fn run_send(
    config_path: &str,
    subject: String,
    body: String,
    recipient: String,
    attachment_dir: Option<String>,
) -> Result<i32> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let mut attachments = Vec::new();
    let mut rejections = Vec::new();

    if let Some(dir) = attachment_dir {
        let dir = shellexpand::tilde(&dir).into_owned();
        let files = collect_files(Path::new(&dir))?;

        for file in files {
            match admit(&file, config.max_file_size, TransferEncoding::Base64) {
                Admission::Accepted(attachment) => attachments.push(attachment),
                Admission::Rejected(rejection) => {
                    log::warn!("Skipping {}: {}", rejection.path.display(), rejection.reason);
                    rejections.push(rejection);
                }
            }
        }
    }

    let limits =
        BatchLimits::for_message(config.max_email_size, config.max_files_per_message, body.len());
    let batches = pack(attachments, &limits);
    log::info!("Prepared {} message(s) for {}", batches.len(), recipient);

    let credentials = SecureCredentials::new()?;
    let password = credentials
        .resolve_smtp_password(&config.sender_email, config.smtp_password.as_deref())?;

    let mut mailer =
        SmtpMailer::connect(&config, &password).context("Failed to open SMTP session")?;

    let envelope = Envelope {
        sender: config.sender_email.clone(),
        recipient,
        subject,
        body,
    };

    let dispatcher = Dispatcher::new(config.send_delay(), CancelToken::new());
    let outcome = dispatcher.deliver(&envelope, batches, rejections, &mut mailer);

    for line in summarize(&outcome) {
        println!("{}", line);
    }

    Ok(match outcome.verdict() {
        Verdict::AllDelivered { .. } => 0,
        Verdict::Partial { .. } => 2,
        Verdict::Failed { .. } => 1,
    })
}
