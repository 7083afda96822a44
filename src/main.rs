//! `saml-provision`: manage SAML connections created from federation metadata.

// std
use std::{
	error::Error as StdError,
	io::{self, BufRead, Write},
	path::PathBuf,
	process::ExitCode,
};
// crates.io
use clap::{Args, Parser, Subcommand};
use saml_provision::{
	auth::Secret,
	bulk::BatchReport,
	command::{self, Context, CreateRequest, LoginRequest, Outcome},
	config::{self, ConfigFile, Env, Overrides},
	error::Error,
	http::ReqwestHttpClient,
};
use tracing_subscriber::EnvFilter;

/// Manage SAML connections in a tenant from federation metadata.
#[derive(Debug, Parser)]
#[command(name = "saml-provision", version, about, long_about = None)]
struct Cli {
	#[command(flatten)]
	global: GlobalArgs,
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
	/// Tenant domain, e.g. `tenant.eu.auth0.com`.
	#[arg(long, global = true)]
	domain: Option<String>,
	/// Management API access token.
	#[arg(long, global = true)]
	token: Option<String>,
	/// Maximum number of API calls in flight at once.
	#[arg(long, global = true)]
	max_concurrent: Option<usize>,
	/// Minimum spacing between API call starts, in milliseconds.
	#[arg(long, global = true, value_name = "MS")]
	min_interval: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Obtain a management API token with client credentials.
	Login {
		/// Client identifier.
		#[arg(long)]
		client_id: Option<String>,
		/// Client secret; read from stdin when absent.
		#[arg(long)]
		client_secret: Option<String>,
	},
	/// Request a new token with the stored client credentials.
	Refresh,
	/// Remove the stored configuration.
	Logout,
	/// Display the stored configuration with secrets hidden.
	Config,
	/// Store `--max-concurrent` and `--min-interval` for later runs.
	RateLimit,
	/// Count the SAML connections.
	Count,
	/// Delete every SAML connection.
	DeleteAll,
	/// Create SAML connections from a metadata file.
	Create {
		/// Federation metadata file.
		metadata: PathBuf,
		/// Service provider entity ID.
		#[arg(short = 'e', long = "entity_id")]
		entity_id: Option<String>,
		/// Only process the first LIMIT identity providers.
		#[arg(short, long)]
		limit: Option<usize>,
		/// Comma-separated client IDs to enable the connections for.
		#[arg(short, long, value_delimiter = ',')]
		clients: Vec<String>,
	},
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	init_tracing();

	let config = match ConfigFile::open_default() {
		Ok(config) => config,
		Err(e) => return fail(&e.into()),
	};
	let GlobalArgs { domain, token, max_concurrent, min_interval } = cli.global;
	let overrides = Overrides {
		domain,
		access_token: token.map(Secret::new),
		max_concurrent,
		min_interval_ms: min_interval,
	};
	let ctx = Context::new(overrides, Env::from_process(), config, ReqwestHttpClient::default());

	run(&ctx, cli.command).await
}

async fn run(ctx: &Context, command: Command) -> ExitCode {
	match command {
		Command::Login { client_id, client_secret } => {
			let client_secret = client_secret
				.map(Secret::new)
				.or_else(|| ctx.env.get(config::ENV_CLIENT_SECRET).map(Secret::new))
				.or_else(read_secret);
			let request = LoginRequest { client_id, client_secret };

			report(
				command::login(ctx, request).await,
				|()| println!("Authentication successful!"),
				Some("Authentication cancelled."),
			)
		},
		Command::Refresh =>
			report(command::refresh(ctx).await, |()| println!("Access token refreshed!"), None),
		Command::Logout => report(
			command::logout(ctx),
			|()| println!("You have been logged out."),
			Some("No configuration to remove."),
		),
		Command::Config => report(
			command::show_config(ctx),
			|view| {
				println!("Source: {}\n", view.path.display());

				for (key, value) in view.entries {
					println!("{key}: {value}");
				}

				println!("(secrets hidden)");
			},
			Some("No configuration. Try to login first."),
		),
		Command::RateLimit => report(
			command::set_rate_limit(ctx, ctx.overrides.max_concurrent, ctx.overrides.min_interval_ms),
			|limits| {
				println!(
					"Rate limit configured: {} concurrent, {} ms between calls.",
					limits.max_concurrent(),
					limits.min_interval_ms(),
				)
			},
			Some("Pass --max-concurrent and/or --min-interval to configure rate limits."),
		),
		Command::Count => report(command::count(ctx).await, |count| println!("{count}"), None),
		Command::DeleteAll => report(
			command::delete_all(ctx).await,
			|batch| {
				print_failures(&batch);

				if batch.is_clean() {
					println!("All SAML connections deleted.");
				} else {
					println!(
						"{} of {} SAML connection(s) deleted.",
						batch.succeeded, batch.attempted
					);
				}
			},
			None,
		),
		Command::Create { metadata, entity_id, limit, clients } => {
			let request = CreateRequest {
				metadata,
				sp_entity_id: entity_id,
				limit,
				enabled_clients: clients,
			};

			report(
				command::create(ctx, request).await,
				|batch| {
					print_failures(&batch);
					println!("{} SAML connection(s) created.", batch.succeeded);
				},
				None,
			)
		},
	}
}

fn report<T, F>(outcome: Outcome<T>, on_completed: F, cancelled: Option<&str>) -> ExitCode
where
	F: FnOnce(T),
{
	match outcome {
		Outcome::Completed(value) => {
			on_completed(value);

			ExitCode::SUCCESS
		},
		Outcome::Cancelled => {
			notify_cancelled(cancelled, &mut io::stdout().lock()).ok();

			ExitCode::SUCCESS
		},
		Outcome::Failed(e) => fail(&e),
	}
}

fn notify_cancelled(message: Option<&str>, out: &mut impl Write) -> io::Result<()> {
	match message {
		Some(message) => writeln!(out, "{message}"),
		None => Ok(()),
	}
}

fn fail(e: &Error) -> ExitCode {
	let mut message = e.to_string();
	let mut source = e.source();

	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());

		source = cause.source();
	}

	eprintln!("Error: {message}");

	ExitCode::FAILURE
}

fn print_failures(batch: &BatchReport) {
	for failure in &batch.failures {
		println!("Error: {} ({})", failure.subject, failure.name);
		println!("{}", failure.error);
	}
}

fn read_secret() -> Option<Secret> {
	eprint!("Client secret: ");

	io::stderr().flush().ok();
	let mut line = String::new();

	io::stdin().lock().read_line(&mut line).ok()?;

	let secret = line.trim();

	if secret.is_empty() { None } else { Some(Secret::new(secret)) }
}

fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.with_target(false)
		.init();
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn cancelled_notice_is_printed_only_when_present() {
		let mut out = Vec::new();

		notify_cancelled(None, &mut out).expect("Writing to a buffer should succeed.");

		assert!(out.is_empty());

		notify_cancelled(Some("No configuration to remove."), &mut out)
			.expect("Writing to a buffer should succeed.");

		assert_eq!(out, b"No configuration to remove.\n");
	}

	#[test]
	fn cancelled_commands_exit_successfully() {
		assert_eq!(report(Outcome::<()>::Cancelled, |()| {}, None), ExitCode::SUCCESS);
		assert_eq!(
			report(Outcome::Failed(Error::Task { reason: "aborted".into() }), |()| {}, None),
			ExitCode::FAILURE,
		);
	}
}
