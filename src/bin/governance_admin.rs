//! Governance Administration CLI
//!
//! Command-line tool for operating the civic governance service

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use civic_governance::auth::issue_token;
use civic_governance::config::AppConfig;
use civic_governance::crypto::SignatureManager;
use civic_governance::database::Database;
use civic_governance::entities::{EntityKind, EntityRegistry, EntityRole, NewEntity};
use civic_governance::governance::approvals::{hash_payload, ApprovalLog};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "governance-admin")]
#[command(about = "Civic Governance Administration Tool")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(long, default_value = "civic-governance.toml")]
    config: PathBuf,

    /// Database URL (overrides the configuration)
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// Create an entity with an initial admin
    CreateEntity {
        /// Entity kind (district, nonprofit, business)
        #[arg(short, long)]
        kind: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Profile id of the initial admin
        #[arg(short, long)]
        admin: String,
    },

    /// Grant a role on an entity
    GrantRole {
        #[arg(short, long)]
        entity: i64,

        #[arg(short, long)]
        profile: String,

        /// Role (admin, editor, viewer, employee)
        #[arg(short, long)]
        role: String,
    },

    /// Issue a bearer token for a profile
    IssueToken {
        /// Profile id; a fresh one is generated when omitted
        #[arg(short, long)]
        profile: Option<String>,

        /// Lifetime in seconds (defaults to the configured value)
        #[arg(short, long)]
        ttl: Option<i64>,
    },

    /// Generate a secp256k1 keypair for signing approvals
    Keygen,

    /// Hash an approval payload and sign it
    Sign {
        /// Hex secret key
        #[arg(short, long)]
        secret_key: String,

        /// Payload as JSON
        #[arg(short, long)]
        payload: String,
    },

    /// Verify an entity's approval chain
    VerifyApprovals {
        #[arg(short, long)]
        entity: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Commands::Migrate => {
            let db = Database::new(&config.database_url).await?;
            db.run_migrations().await?;
            println!("Migrations applied to {}", config.database_url);
        }

        Commands::CreateEntity { kind, name, admin } => {
            let kind: EntityKind = kind.parse().map_err(|e: String| anyhow!(e))?;
            let db = open_database(&config).await?;
            let entity = EntityRegistry::new(db.pool().clone())
                .create_entity(
                    &NewEntity {
                        kind,
                        name,
                        slug: None,
                    },
                    &admin,
                )
                .await?;

            println!("Entity created:");
            println!("  ID: {}", entity.id);
            println!("  Kind: {}", entity.kind);
            println!("  Name: {}", entity.name);
            println!("  Slug: {}", entity.slug);
            println!("  Admin: {}", admin);
        }

        Commands::GrantRole {
            entity,
            profile,
            role,
        } => {
            let role: EntityRole = role.parse().map_err(|e: String| anyhow!(e))?;
            let db = open_database(&config).await?;
            let binding = EntityRegistry::new(db.pool().clone())
                .grant_role(entity, &profile, role, "governance-admin")
                .await?;
            println!(
                "Granted {} on entity {} to {}",
                binding.role, binding.entity_id, binding.profile_id
            );
        }

        Commands::IssueToken { profile, ttl } => {
            let profile = profile.unwrap_or_else(|| Uuid::new_v4().to_string());
            let ttl = ttl.unwrap_or(config.token_ttl_secs);
            let token = issue_token(&profile, &config.jwt_secret, ttl)?;
            println!("Profile: {}", profile);
            println!("Expires in: {}s", ttl);
            println!("Token: {}", token);
        }

        Commands::Keygen => {
            let (secret_key, public_key) = SignatureManager::new().generate_keypair();
            println!("Secret key: {}", SignatureManager::encode_secret_key(&secret_key));
            println!("Public key: {}", SignatureManager::encode_public_key(&public_key));
        }

        Commands::Sign {
            secret_key,
            payload,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            let secret_key = SignatureManager::parse_secret_key(&secret_key)?;
            let manager = SignatureManager::new();
            let payload_hash = hash_payload(&payload);
            let signature = manager.sign_payload_hash(&payload_hash, &secret_key)?;
            let public_key =
                SignatureManager::encode_public_key(&manager.public_key_from_secret(&secret_key));

            println!("Payload hash: {}", payload_hash);
            println!("Signature: {}", signature);
            println!("Public key: {}", public_key);
        }

        Commands::VerifyApprovals { entity } => {
            let db = open_database(&config).await?;
            let log = ApprovalLog::new(db.pool().clone(), config.governance.require_approval_signatures);
            let result = log.verify_chain(entity).await?;

            if result.valid {
                println!("✅ Approval chain valid ({} entries)", result.entries);
            } else {
                println!("❌ Approval chain broken");
                if let Some(index) = result.broken_at {
                    println!("  Entry: {}", index);
                }
                if let Some(message) = result.error_message {
                    println!("  Error: {}", message);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn open_database(config: &AppConfig) -> Result<Database> {
    let db = Database::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open {}", config.database_url))?;
    db.run_migrations().await?;
    Ok(db)
}
