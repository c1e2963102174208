use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::broadcast::error::RecvError;

use tapedeck_lib::audio::LocalEngine;
use tapedeck_lib::config::AppConfig;
use tapedeck_lib::library;
use tapedeck_lib::playback::{SessionEvent, StartMode};
use tapedeck_lib::playlist::{MoveRequest, PlaylistSort, ReorderOutcome};
use tapedeck_lib::settings::FullscreenBehavior;
use tapedeck_lib::AppState;

fn print_usage() {
    println!(
        "Usage: tapedeck <command> [args]

Commands:
  playlists [--search TEXT] [--sort ORDER]   List playlists
  import <folder> [name]                     Create a playlist from a folder
  create <name> <file|folder>...             Create a playlist from files
  rename <playlist> <name>                   Rename a playlist
  delete <playlist>                          Delete a playlist
  items <playlist>                           List a playlist's items
  add <playlist> <file|folder>...            Append files to a playlist
  sync <playlist> <folder>                   Match a playlist to a folder's contents
  remove <item>                              Remove an item
  rename-item <item> <name>                  Rename an item
  move <playlist> <from> <to>                Move the item at index <from> to index <to>
  play <item> [--continue | --from-start]    Play an item until it ends or Ctrl-C
  history [limit]                            Recently played items
  errors [limit]                             Recent playback errors
  fullscreen [auto|default]                  Show or set the fullscreen behavior
  setting <key> [value]                      Show or set a raw setting"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        process::exit(2);
    };
    if command == "--help" || command == "-h" {
        print_usage();
        return Ok(());
    }
    let args: Vec<String> = args.collect();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let app = AppState::open(config, Arc::new(LocalEngine::new()))
        .await
        .context("Failed to open the playlist database")?;

    let result = run(&app, &command, &args).await;
    app.close().await?;
    result
}

async fn run(app: &AppState, command: &str, args: &[String]) -> Result<()> {
    match command {
        "playlists" => list_playlists(app, args).await,
        "import" => {
            let folder = arg(args, 0, "folder")?;
            let dir = Path::new(folder);
            let name = args
                .get(1)
                .cloned()
                .unwrap_or_else(|| library::suggest_playlist_name(dir));
            let files = library::collect_media_files(dir)?;
            let playlist = app.playlists.create_playlist(&name, &files).await?;
            println!("{}  {} ({} items)", playlist.id, playlist.name, files.len());
            Ok(())
        }
        "create" => {
            let name = arg(args, 0, "name")?;
            let files = expand_paths(&args[1..])?;
            let playlist = app.playlists.create_playlist(name, &files).await?;
            println!("{}  {}", playlist.id, playlist.name);
            Ok(())
        }
        "rename" => {
            app.playlists
                .rename_playlist(arg(args, 0, "playlist")?, arg(args, 1, "name")?)
                .await?;
            Ok(())
        }
        "delete" => {
            app.playlists.delete_playlist(arg(args, 0, "playlist")?).await?;
            Ok(())
        }
        "items" => list_items(app, arg(args, 0, "playlist")?).await,
        "add" => {
            let playlist_id = arg(args, 0, "playlist")?;
            let files = expand_paths(&args[1..])?;
            let added = app.playlists.add_items(playlist_id, &files).await?;
            println!("Added {} items", added.len());
            Ok(())
        }
        "sync" => {
            let playlist_id = arg(args, 0, "playlist")?;
            let dir = Path::new(arg(args, 1, "folder")?);
            let files = library::collect_media_files(dir)?;
            let name = app.playlists.get_playlist(playlist_id).await?.name;
            let details = app.playlists.sync_items(playlist_id, &name, &files).await?;
            println!("{} now has {} items", details.playlist.name, details.items.len());
            Ok(())
        }
        "remove" => {
            app.playlists.remove_item(arg(args, 0, "item")?).await?;
            Ok(())
        }
        "rename-item" => {
            app.playlists
                .rename_item(arg(args, 0, "item")?, arg(args, 1, "name")?)
                .await?;
            Ok(())
        }
        "move" => {
            let playlist_id = arg(args, 0, "playlist")?;
            let source = index(args, 1, "from")?;
            let target = index(args, 2, "to")?;
            match app
                .playlists
                .reorder_items(playlist_id, &MoveRequest::Index { source, target })
                .await?
            {
                ReorderOutcome::Unchanged => println!("Order unchanged"),
                ReorderOutcome::Reordered(_) => list_items(app, playlist_id).await?,
            }
            Ok(())
        }
        "play" => play(app, args).await,
        "history" => {
            let limit = limit(args, app.config.history_limit)?;
            for entry in app.history.recent(limit).await? {
                println!(
                    "{}  {:<9} {} / {}",
                    format_time(entry.played_at),
                    format!("{:?}", entry.kind),
                    entry.playlist_name,
                    entry.item_name
                );
            }
            Ok(())
        }
        "errors" => {
            let limit = limit(args, app.config.history_limit)?;
            for entry in app.error_log.recent(limit).await? {
                println!("{}  {}", format_time(entry.logged_at), entry.message);
                if !entry.detail.is_empty() {
                    println!("    {}", entry.detail);
                }
            }
            Ok(())
        }
        "fullscreen" => {
            match args.first() {
                Some(value) => {
                    let behavior: FullscreenBehavior = value.parse()?;
                    app.settings.set_fullscreen_behavior(behavior).await?;
                }
                None => println!("{}", app.settings.fullscreen_behavior().await?),
            }
            Ok(())
        }
        "setting" => {
            let key = arg(args, 0, "key")?;
            match args.get(1) {
                Some(value) => app.settings.set(key, value).await?,
                None => match app.settings.get(key).await? {
                    Some(value) => println!("{value}"),
                    None => println!("(unset)"),
                },
            }
            Ok(())
        }
        other => bail!("Unknown command: {other}. Use --help for usage."),
    }
}

async fn list_playlists(app: &AppState, args: &[String]) -> Result<()> {
    let mut search = None;
    let mut sort = PlaylistSort::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--search" => {
                search = Some(iter.next().ok_or_else(|| anyhow!("--search needs a value"))?);
            }
            "--sort" => {
                let value = iter.next().ok_or_else(|| anyhow!("--sort needs a value"))?;
                sort = value.parse().map_err(|e: String| anyhow!(e))?;
            }
            other => bail!("Unexpected argument: {other}"),
        }
    }

    let selected = app.settings.selected_playlist_id().await?;
    for playlist in app
        .playlists
        .get_playlists(search.map(String::as_str), sort)
        .await?
    {
        let marker = if selected.as_deref() == Some(playlist.id.as_str()) { "*" } else { " " };
        let played = playlist
            .last_played_at
            .map(format_time)
            .unwrap_or_else(|| "never".to_string());
        println!("{} {}  {}  (last played {})", marker, playlist.id, playlist.name, played);
    }
    Ok(())
}

async fn list_items(app: &AppState, playlist_id: &str) -> Result<()> {
    let selected = app
        .playlists
        .selected_item(playlist_id)
        .await?
        .map(|item| item.id);
    for (index, item) in app.playlists.get_items(playlist_id).await?.iter().enumerate() {
        let marker = if selected.as_deref() == Some(item.id.as_str()) { "*" } else { " " };
        let progress = if item.is_finished() {
            "done".to_string()
        } else {
            format!("{}%", item.progress_percent())
        };
        println!("{} {:>3}. {}  {:>4}  {}", marker, index, item.id, progress, item.name);
    }
    Ok(())
}

async fn play(app: &AppState, args: &[String]) -> Result<()> {
    let item_id = arg(args, 0, "item")?;
    let mut events = app.session.subscribe();

    match args.get(1).map(String::as_str) {
        Some("--continue") => app.session.play(item_id, StartMode::Continue).await?,
        Some("--from-start") => app.session.play(item_id, StartMode::FromStart).await?,
        Some(other) => bail!("Unexpected argument: {other}"),
        None => {
            app.session.play_default(item_id).await?;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Started { resumed_from_secs, .. }) => match resumed_from_secs {
                    Some(secs) => println!("Playing from {}", format_offset(secs)),
                    None => println!("Playing"),
                },
                Ok(SessionEvent::Ended { .. }) => {
                    println!("Finished");
                    break;
                }
                Ok(SessionEvent::Error { message, .. }) => bail!("Playback failed: {message}"),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                app.session.stop().await?;
                let position = app.session.last_position_ms() / 1000;
                println!("Stopped at {}", format_offset(position as i64));
                break;
            }
        }
    }
    Ok(())
}

/// Folders expand to the media files below them; plain paths pass through.
fn expand_paths(args: &[String]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for path in args {
        if Path::new(path).is_dir() {
            files.extend(library::collect_media_files(Path::new(path))?);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing <{name}>. Use --help for usage."))
}

fn index(args: &[String], position: usize, name: &str) -> Result<usize> {
    let value = arg(args, position, name)?;
    value
        .parse()
        .with_context(|| format!("Invalid value for <{name}>: {value}"))
}

fn limit(args: &[String], default: i64) -> Result<i64> {
    match args.first() {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid limit: {value}")),
        None => Ok(default),
    }
}

fn format_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn format_offset(secs: i64) -> String {
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}
