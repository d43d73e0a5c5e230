//! chanfind CLI - Channel Directory

use chanfind::storage::memory::MemoryBackend;
use chanfind::{Channel, Directory, DirectoryConfig, Property, PropertyRef, Tag, TagRef};
use cfql::QueryParams;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chanfind")]
#[command(about = "A channel directory with tag and property queries", long_about = None)]
struct Cli {
    /// JSON snapshot holding the directory
    #[arg(short, long, default_value = "chanfind.json")]
    data: PathBuf,

    /// Optional YAML configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty snapshot
    Init,

    /// List channels matching a query such as "~name=SR*&~tag=archived"
    Query {
        #[arg(default_value = "")]
        query: String,
    },

    /// Count channels matching a query (pagination is ignored)
    Count {
        #[arg(default_value = "")]
        query: String,
    },

    /// Export every matching channel through a scroll cursor
    Export {
        #[arg(default_value = "")]
        query: String,
    },

    /// Show one channel
    Show { name: String },

    /// Create or replace a channel
    ChannelPut {
        name: String,
        #[arg(short, long)]
        owner: String,
        /// Tag names to attach
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Properties as NAME=VALUE
        #[arg(short, long = "property")]
        properties: Vec<String>,
    },

    /// Delete a channel
    ChannelRemove { name: String },

    /// List tags
    Tags,

    /// List properties
    Properties,

    /// Create or replace a tag; the listed channels become its members
    TagPut {
        name: String,
        #[arg(short, long)]
        owner: String,
        channels: Vec<String>,
    },

    /// Add a tag to one channel
    TagAdd { name: String, channel: String },

    /// Delete a tag, or remove it from one channel
    TagRemove {
        name: String,
        #[arg(long)]
        channel: Option<String>,
    },

    /// Create or replace a property; members given as CHANNEL=VALUE
    PropertyPut {
        name: String,
        #[arg(short, long)]
        owner: String,
        members: Vec<String>,
    },

    /// Delete a property, or remove it from one channel
    PropertyRemove {
        name: String,
        #[arg(long)]
        channel: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DirectoryConfig::load(path)?,
        None => DirectoryConfig::default(),
    };

    if let Commands::Init = cli.command {
        return init_snapshot(&cli.data, &config).await;
    }

    let backend = Arc::new(
        MemoryBackend::load(&cli.data)
            .await?
            .with_max_result_window(config.max_result_window),
    );
    let directory = Directory::new(backend.clone(), config);

    let modified = run(&directory, cli.command).await?;
    if modified {
        backend.save(&cli.data).await?;
    }
    Ok(())
}

async fn init_snapshot(path: &Path, config: &DirectoryConfig) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    let backend = MemoryBackend::new().with_max_result_window(config.max_result_window);
    backend.save(path).await?;
    println!("Initialized empty directory at {}", path.display());
    Ok(())
}

/// Run one command; returns whether the snapshot needs saving
async fn run(directory: &Directory, command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Init => Ok(false),
        Commands::Query { query } => {
            let params = QueryParams::parse(&query);
            print_json(&directory.channels().query(&params).await?)?;
            Ok(false)
        }
        Commands::Count { query } => {
            let params = QueryParams::parse(&query);
            println!("{}", directory.channels().count(&params).await?);
            Ok(false)
        }
        Commands::Export { query } => {
            let compiled = cfql::compile_str(&query)?;
            let channels = directory.scroll().export(&compiled.predicate).await?;
            print_json(&channels)?;
            Ok(false)
        }
        Commands::Show { name } => {
            print_json(&directory.channels().read(&name).await?)?;
            Ok(false)
        }
        Commands::ChannelPut {
            name,
            owner,
            tags,
            properties,
        } => {
            let mut channel = Channel::new(name.clone(), owner);
            for tag in tags {
                channel.add_tag(TagRef::new(tag, ""));
            }
            for property in properties {
                let (key, value) = split_pair(&property)?;
                channel.add_property(PropertyRef::new(key, "", value));
            }
            print_json(&directory.channels().create(&name, channel).await?)?;
            Ok(true)
        }
        Commands::ChannelRemove { name } => {
            directory.channels().remove(&name).await?;
            println!("Channel '{}' deleted.", name);
            Ok(true)
        }
        Commands::Tags => {
            print_json(&directory.tags().list().await?)?;
            Ok(false)
        }
        Commands::Properties => {
            print_json(&directory.properties().list().await?)?;
            Ok(false)
        }
        Commands::TagPut {
            name,
            owner,
            channels,
        } => {
            let tag = Tag::new(name.clone(), owner).with_channels(channels);
            print_json(&directory.tags().create(&name, tag).await?)?;
            Ok(true)
        }
        Commands::TagAdd { name, channel } => {
            let payload = Tag::new(name.clone(), "");
            print_json(&directory.tags().add_single(&name, &channel, &payload).await?)?;
            Ok(true)
        }
        Commands::TagRemove { name, channel } => {
            match channel {
                Some(channel) => {
                    directory.tags().remove_single(&name, &channel).await?;
                    println!("Tag '{}' removed from '{}'.", name, channel);
                }
                None => {
                    directory.tags().remove(&name).await?;
                    println!("Tag '{}' deleted.", name);
                }
            }
            Ok(true)
        }
        Commands::PropertyPut {
            name,
            owner,
            members,
        } => {
            let members = members
                .iter()
                .map(|m| split_pair(m))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let property = Property::new(name.clone(), owner).with_channel_values(members);
            print_json(&directory.properties().create(&name, property).await?)?;
            Ok(true)
        }
        Commands::PropertyRemove { name, channel } => {
            match channel {
                Some(channel) => {
                    directory.properties().remove_single(&name, &channel).await?;
                    println!("Property '{}' removed from '{}'.", name, channel);
                }
                None => {
                    directory.properties().remove(&name).await?;
                    println!("Property '{}' deleted.", name);
                }
            }
            Ok(true)
        }
    }
}

fn split_pair(pair: &str) -> anyhow::Result<(&str, &str)> {
    pair.split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got '{}'", pair))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
