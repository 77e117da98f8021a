use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use coursecat::category::{
    AllowAll, CategoryError, CategoryStore, CategoryUpdate, NewCategory, TreeCache,
};
use coursecat::config::Config;
use coursecat::storage::{Database, DatabaseError, NewCourse, SiblingOrder};
use coursecat::tree::{
    fragment_json, CategoryView, ExpandError, RenderedCategory, ShowCourses, TreeRenderer,
};

/// Get the config directory path (~/.config/coursecat/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("coursecat"))
}

#[derive(Parser, Debug)]
#[command(name = "coursecat", about = "Manage and display a course category tree")]
struct Args {
    /// Config file (default: ~/.config/coursecat/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overriding the config file
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the category tree
    Tree {
        #[arg(long, default_value_t = 0)]
        root: i64,
        /// Levels to load; 0 loads everything
        #[arg(long)]
        depth: Option<i64>,
        #[arg(long, value_name = "MODE")]
        show_courses: Option<ShowCourses>,
        /// Print JSON instead of an outline
        #[arg(long)]
        json: bool,
    },
    /// Create a category
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 0)]
        parent: i64,
        #[arg(long)]
        idnumber: Option<String>,
        #[arg(long)]
        hidden: bool,
    },
    Rename { id: i64, name: String },
    /// Move a category under another one (0 for the top level)
    Move {
        id: i64,
        #[arg(long)]
        to: i64,
    },
    Hide { id: i64 },
    Show { id: i64 },
    /// Delete a category with its content, or move the content first
    Delete {
        id: i64,
        #[arg(long, value_name = "ID")]
        move_to: Option<i64>,
    },
    /// Print the JSON fragment for a placeholder node
    Expand {
        id: i64,
        #[arg(long)]
        depth: i64,
        #[arg(long, value_name = "MODE")]
        show_courses: Option<ShowCourses>,
    },
    AddCourse {
        #[arg(long)]
        category: i64,
        #[arg(long)]
        shortname: String,
        #[arg(long)]
        fullname: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Sort the subcategories of a category (0 for the top level)
    Resort {
        id: i64,
        #[arg(long, value_enum, default_value_t = SortField::Name)]
        by: SortField,
    },
    /// Move a category one place up among its siblings
    Up { id: i64 },
    /// Move a category one place down among its siblings
    Down { id: i64 },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortField {
    Name,
    Idnumber,
}

impl From<SortField> for SiblingOrder {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Name => SiblingOrder::Name,
            SortField::Idnumber => SiblingOrder::IdNumber,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_deref().unwrap_or("warn")))
        .context("Invalid log_level in config")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = match args.db.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            config_dir.join("coursecat.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: The category database is in use by another process. Please try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let store = CategoryStore::new(
        db,
        Arc::new(TreeCache::new(config.cache_capacity)),
        Arc::new(AllowAll),
    )
    .with_default_category_name(&config.default_category_name);

    match run(&store, &config, args.command).await {
        Ok(()) => Ok(()),
        Err(err) => match user_error(&err) {
            Some(message) => {
                eprintln!("Error: {message}");
                std::process::exit(2);
            }
            None => Err(err),
        },
    }
}

/// Errors caused by bad input rather than a broken database; these exit
/// with status 2.
fn user_error(err: &anyhow::Error) -> Option<String> {
    if let Some(category_err) = err.downcast_ref::<CategoryError>() {
        return category_err.is_user_error().then(|| category_err.to_string());
    }
    match err.downcast_ref::<ExpandError>()? {
        ExpandError::Category(category_err) if category_err.is_user_error() => {
            Some(category_err.to_string())
        }
        json_err @ ExpandError::Json(_) => Some(json_err.to_string()),
        _ => None,
    }
}

async fn run(store: &CategoryStore, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Tree {
            root,
            depth,
            show_courses,
            json,
        } => {
            let mut options = config.tree.display_options();
            if let Some(depth) = depth {
                options.subcategory_depth = depth;
            }
            if let Some(mode) = show_courses {
                options.show_courses = mode;
            }
            let category = store.require(root).await?;
            let view = CategoryView::new(store.clone(), category, options);
            let tree = TreeRenderer::new()
                .with_descriptions()
                .render(&view)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                print_outline(&tree, 0);
            }
        }
        Command::Create {
            name,
            parent,
            idnumber,
            hidden,
        } => {
            let category = store
                .create(NewCategory {
                    name,
                    idnumber,
                    parent,
                    visible: hidden.then_some(false),
                    ..NewCategory::default()
                })
                .await?;
            println!("Created category {} ({})", category.id, category.path);
        }
        Command::Rename { id, name } => {
            let category = store
                .update(
                    id,
                    CategoryUpdate {
                        name: Some(name),
                        ..CategoryUpdate::default()
                    },
                )
                .await?;
            println!("Renamed category {} to {}", id, category.name);
        }
        Command::Move { id, to } => {
            if store.change_parent(id, to).await? {
                let moved = store.require_unchecked(id).await?;
                println!("Moved category {} to {}", id, moved.path);
            } else {
                println!("Category {id} is already there");
            }
        }
        Command::Hide { id } => report_change(store.hide(id).await?, id, "hidden"),
        Command::Show { id } => report_change(store.show(id).await?, id, "shown"),
        Command::Delete { id, move_to } => match move_to {
            Some(target) => {
                if !store.can_move_content_to(id, target).await? {
                    anyhow::bail!("Content of category {id} cannot be moved to {target}");
                }
                store.delete_move(id, target).await?;
                println!("Deleted category {id}, content moved to {target}");
            }
            None => {
                if !store.can_delete_full(id).await? {
                    anyhow::bail!("Category {id} cannot be deleted");
                }
                let deleted = store.delete_full(id).await?;
                println!(
                    "Deleted {} categories and {} courses",
                    deleted.categories.len(),
                    deleted.courses.len()
                );
            }
        },
        Command::Expand {
            id,
            depth,
            show_courses,
        } => {
            let base = config.tree.display_options();
            let request = serde_json::json!({
                "categoryId": id,
                "depth": depth,
                "showCourses": show_courses.unwrap_or(base.show_courses),
            });
            let fragment = fragment_json(store, &base, &request.to_string()).await?;
            println!("{fragment}");
        }
        Command::AddCourse {
            category,
            shortname,
            fullname,
            summary,
        } => {
            let target = store.require_unchecked(category).await?;
            if target.is_root() {
                anyhow::bail!("Courses must belong to a category");
            }
            let course_id = store
                .database()
                .insert_course(&NewCourse {
                    category: target.id,
                    fullname,
                    shortname,
                    summary,
                    visible: target.visible,
                    ..NewCourse::default()
                })
                .await
                .context("Failed to add course")?;
            println!("Added course {course_id} to category {}", target.id);
        }
        Command::Resort { id, by } => {
            store.resort_subcategories(id, by.into()).await?;
            println!("Resorted subcategories of {id}");
        }
        Command::Up { id } => {
            report_change(store.change_sortorder_by_one(id, true).await?, id, "moved up")
        }
        Command::Down { id } => {
            report_change(store.change_sortorder_by_one(id, false).await?, id, "moved down")
        }
    }
    Ok(())
}

fn report_change(changed: bool, id: i64, what: &str) {
    if changed {
        println!("Category {id} {what}");
    } else {
        println!("Category {id} unchanged");
    }
}

fn print_outline(node: &RenderedCategory, indent: usize) {
    let pad = "  ".repeat(indent);
    let mut line = format!("{pad}{} [{}]", node.name, node.id);
    if node.is_dimmed {
        line.push_str(" (hidden)");
    }
    if !node.is_loaded && node.has_children {
        line.push_str(" +");
    }
    println!("{line}");

    for child in &node.categories {
        print_outline(child, indent + 1);
    }
    if node.category_paging.is_some() {
        println!("{pad}  ...");
    }
    for course in &node.courses {
        let dimmed = if course.is_dimmed { " (hidden)" } else { "" };
        println!("{pad}  * {} {}{dimmed}", course.shortname, course.name);
        if let Some(summary) = &course.summary {
            println!("{pad}      {summary}");
        }
    }
    if node.course_paging.is_some() {
        println!("{pad}  ...");
    }
}
