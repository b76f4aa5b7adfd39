//! Wires settings and credentials into a pipeline and runs the session.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use book_courier::catalog::{LibgenCatalog, ZLibraryClient};
use book_courier::delivery::{MailEnvelope, SendGridMailer, finish_batch};
use book_courier::download::{HttpLinkResolver, MirrorDownloader, WebDriverLauncher};
use book_courier::library::EbookConvert;
use book_courier::metadata::OpenLibraryLookup;
use book_courier::not_found::NotFoundLog;
use book_courier::pipeline::{BatchSummary, BookPipeline};
use book_courier::relevance::OpenAiJudge;
use book_courier::request::{BookRequest, read_csv_requests};
use tracing::{debug, info, warn};

use crate::app_config::{Credentials, FallbackLogin, Settings};
use crate::cli::Args;
use crate::progress::BatchProgress;
use crate::prompt::{FinishChoices, MenuChoice, Prompter};

/// Runs one session: a CLI batch or the interactive loop, then the
/// optional send/clear step.
pub(crate) async fn run(args: &Args, settings: &Settings, credentials: &Credentials) -> Result<()> {
    let pipeline = build_pipeline(settings, credentials).await?;
    let show_progress = !args.quiet;

    let finish = if args.is_interactive() {
        let stdin = io::stdin();
        let mut prompter = Prompter::new(stdin.lock(), io::stdout());
        match run_interactive(&pipeline, &mut prompter, show_progress).await? {
            Some(choices) => choices,
            None => return Ok(()),
        }
    } else {
        let requests = cli_requests(args)?;
        run_with_progress(&pipeline, &requests, show_progress).await;
        FinishChoices {
            send: args.send,
            clear: args.clear,
        }
    };

    finish_session(settings, credentials, finish).await
}

/// The interactive loop. `None` when the user ended it with an invalid menu choice.
async fn run_interactive<R: BufRead, W: Write>(
    pipeline: &BookPipeline,
    prompter: &mut Prompter<R, W>,
    show_progress: bool,
) -> Result<Option<FinishChoices>> {
    loop {
        let Some(choice) = prompter.menu()? else {
            return Ok(None);
        };
        match menu_requests(choice) {
            Ok(requests) => {
                run_with_progress(pipeline, &requests, show_progress).await;
            }
            Err(error) => warn!(error = %format!("{error:#}"), "Cannot read requests"),
        }
        if !prompter.another()? {
            break;
        }
    }
    Ok(Some(prompter.finish_choices()?))
}

fn menu_requests(choice: MenuChoice) -> Result<Vec<BookRequest>> {
    let requests = match choice {
        MenuChoice::Csv(path) => read_csv_requests(&path)?,
        MenuChoice::Title(title) => vec![BookRequest::title_only(title)],
        MenuChoice::TitleWithLink { title, link } => vec![BookRequest::with_link(title, link)],
    };
    Ok(requests)
}

fn cli_requests(args: &Args) -> Result<Vec<BookRequest>> {
    if let Some(path) = &args.csv {
        return Ok(read_csv_requests(path)?);
    }
    if let Some(link) = &args.link {
        if args.title.len() != 1 {
            anyhow::bail!("--link needs exactly one --title, got {}", args.title.len());
        }
        return Ok(vec![BookRequest::with_link(args.title[0].clone(), link.clone())]);
    }
    Ok(args.title.iter().cloned().map(BookRequest::title_only).collect())
}

async fn run_with_progress(
    pipeline: &BookPipeline,
    requests: &[BookRequest],
    show_progress: bool,
) -> BatchSummary {
    let progress = BatchProgress::new(show_progress && !requests.is_empty());
    let summary = pipeline
        .run_batch_with_progress(requests, |position, total, request| {
            progress.start(position, total, &request.title);
        })
        .await;
    progress.finish();
    info!(
        stored = summary.stored.len(),
        not_found = summary.not_found.len(),
        failed = summary.failed.len(),
        total = summary.total(),
        "Requests processed"
    );
    summary
}

async fn finish_session(
    settings: &Settings,
    credentials: &Credentials,
    choices: FinishChoices,
) -> Result<()> {
    let envelope = match (&credentials.sender_email, &credentials.kindle_email) {
        (Some(from), Some(to)) => Some(MailEnvelope::new(from, to)),
        _ => None,
    };
    let send = if choices.send && envelope.is_none() {
        warn!("SENDER_EMAIL and KINDLE_EMAIL must be set to send books; skipping delivery");
        false
    } else {
        choices.send
    };
    let mut envelope = envelope.unwrap_or_else(|| MailEnvelope::new("", ""));
    if let Some(subject) = &settings.mail_subject {
        envelope = envelope.with_subject(subject);
    }

    let mailer = SendGridMailer::new(credentials.sendgrid_api_key.clone(), settings.timeouts)?;
    let outcome = finish_batch(&settings.books_dir, &mailer, &envelope, send, choices.clear).await?;
    if let Some(report) = outcome.delivery {
        info!(sent = report.sent, failed = report.failed, "Delivery finished");
    }
    if let Some(cleared) = outcome.cleared {
        info!(cleared, books_dir = %settings.books_dir.display(), "Books folder cleared");
    }
    Ok(())
}

async fn build_pipeline(settings: &Settings, credentials: &Credentials) -> Result<BookPipeline> {
    let timeouts = settings.timeouts;
    let metadata = OpenLibraryLookup::new(timeouts)?;
    let primary = LibgenCatalog::new(timeouts)?;
    let judge = OpenAiJudge::new(
        &settings.llm_base_url,
        settings.llm_model.clone(),
        credentials.openai_api_key.clone(),
        timeouts,
    )?;
    if credentials.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; every candidate will be rejected");
    }

    let resolver = HttpLinkResolver::new(settings.mirror_label.clone(), timeouts)?;
    let launcher = WebDriverLauncher::new(settings.webdriver_url.clone(), settings.headless);
    let downloader = MirrorDownloader::new(
        Box::new(resolver),
        Box::new(launcher),
        settings.downloads_dir.clone(),
    )
    .with_wait(settings.wait)
    .with_settle_delay(settings.settle_delay);

    let mut builder = BookPipeline::builder(
        Box::new(metadata),
        Box::new(primary),
        Box::new(judge),
        downloader,
        Box::new(EbookConvert::new(settings.converter.clone())),
        NotFoundLog::new(&settings.logs_dir),
        settings.books_dir.clone(),
    );
    if let Some(fallback) = login_fallback(settings, credentials).await? {
        builder = builder.fallback(Box::new(fallback));
    }
    Ok(builder.build())
}

/// Logs in to the fallback catalog. `None` disables it.
async fn login_fallback(
    settings: &Settings,
    credentials: &Credentials,
) -> Result<Option<ZLibraryClient>> {
    let Some(login) = credentials.fallback_login() else {
        info!("No Z-Library credentials; fallback catalog disabled");
        return Ok(None);
    };
    let mut client = ZLibraryClient::new(settings.timeouts)?;
    let attempt = match login {
        FallbackLogin::Token { user_id, user_key } => {
            client.login_with_token(user_id, user_key).await
        }
        FallbackLogin::Password { email, password } => client.login(email, password).await,
    };
    match attempt.map(book_courier::catalog::ZLibraryResponse::into_result) {
        Ok(Ok(user)) => {
            debug!(user = %user.id, "Fallback catalog session ready");
            Ok(Some(client))
        }
        Ok(Err(error)) => {
            warn!(error = %error, "Z-Library login rejected; fallback catalog disabled");
            Ok(None)
        }
        Err(error) => {
            warn!(error = %error, "Z-Library login failed; fallback catalog disabled");
            Ok(None)
        }
    }
}

pub(crate) fn load_credentials() -> Credentials {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(error) if error.not_found() => {}
        Err(error) => warn!(error = %error, "Cannot read .env"),
    }
    Credentials::from_env()
}
