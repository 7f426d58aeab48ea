use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use modeldeck_core_sdk::{
    catalog::{CatalogApi, CatalogClient, CatalogFilters},
    config, db,
    keystore::KeyStore,
    models::{parse_choice, Category, ModelDescriptor, Role, Tier},
    playground::{AudioFile, PlaygroundClient},
    server, telemetry,
    views::{
        info_rows, AudioOutput, AudioPlayground, CatalogView, Header, ImagePlayground, Outcome,
        Playground, PlaygroundKind, TextPlayground,
    },
};

/**
 * \brief CLI 程序入口：浏览模型目录并在终端中使用各 Playground。
 */
#[derive(Parser, Debug)]
#[command(name = "modeldeck", version, about = "Browse AI models and try them in playgrounds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 管理本地保存的 API Key。
     */
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /**
     * \brief 设置客户端访问的后端地址。
     */
    Backend {
        /** \brief 后端根地址；省略时打印当前生效的地址 */
        url: Option<String>,
    },

    /**
     * \brief 开关本地遥测日志（logs/modeldeck.log）。
     */
    Telemetry {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },

    /**
     * \brief 列出模型目录。
     */
    Models {
        #[arg(long, default_value = "all")]
        tier: String,
        #[arg(long, default_value = "all")]
        category: String,
        /** \brief 按名称或描述过滤（忽略大小写） */
        #[arg(long, default_value = "")]
        search: String,
    },

    /**
     * \brief 查看单个模型详情。
     */
    Model { name: String },

    /**
     * \brief 按模型类别进入对应的 Playground（交互式，/exit 退出）。
     */
    Play {
        #[arg(long)]
        model: String,
        /** \brief 语音合成结果写入的文件 */
        #[arg(long, default_value = "speech.mp3")]
        out: PathBuf,
    },

    /**
     * \brief 交互式文本对话，输入 /exit 退出。
     */
    Chat {
        #[arg(long)]
        model: String,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /**
     * \brief 根据提示词生成图片。
     */
    Image {
        #[arg(long)]
        model: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        n: Option<u32>,
    },

    /**
     * \brief 音频转写。
     */
    Transcribe {
        #[arg(long)]
        model: String,
        #[arg(long)]
        file: PathBuf,
    },

    /**
     * \brief 文本转语音，结果写入文件。
     */
    Speak {
        #[arg(long)]
        model: String,
        #[arg(long)]
        input: String,
        #[arg(long)]
        voice: Option<String>,
        #[arg(long, default_value = "speech.mp3")]
        out: PathBuf,
    },

    /**
     * \brief 启动代理后端。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:8001")]
        addr: String,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    Set { key: String },
    Clear,
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::set_log_dir(config::log_dir());
    let conn = db::open_default_db().context("open database failed")?;
    let telemetry_enabled = db::get_telemetry_enabled(&conn).unwrap_or(false);
    telemetry::set_enabled(telemetry_enabled);
    let mut keys = KeyStore::open(conn).context("load api key failed")?;

    match cli.command {
        Commands::Key { action } => match action {
            KeyAction::Set { key } => {
                keys.set(&key).context("save api key failed")?;
                println!("API key saved ({})", telemetry::mask_key(&key));
            }
            KeyAction::Clear => {
                keys.clear().context("clear api key failed")?;
                println!("API key cleared");
            }
            KeyAction::Show => {
                if keys.is_present() {
                    println!("API key: {}", telemetry::mask_key(keys.get()));
                } else {
                    println!("No API key set. Run: modeldeck key set <KEY>");
                }
            }
        },
        Commands::Backend { url } => {
            if let Some(url) = url {
                db::set_backend_url(keys.connection(), &url).context("save backend url failed")?;
            }
            println!(
                "Backend: {}",
                config::resolve_backend_url(keys.connection())?
            );
        }
        Commands::Telemetry { state } => {
            let enabled = state == "on";
            db::set_telemetry_enabled(keys.connection(), enabled)
                .context("save telemetry failed")?;
            telemetry::set_enabled(enabled);
            if enabled {
                println!("Telemetry enabled ({})", telemetry::log_path().display());
            } else {
                println!("Telemetry disabled");
            }
        }
        Commands::Models {
            tier,
            category,
            search,
        } => {
            let filters = CatalogFilters {
                tier: parse_choice::<Tier>(&tier)?,
                category: parse_choice::<Category>(&category)?,
            };
            let catalog = CatalogClient::new(&backend_url(&keys)?)?;
            let mut view = CatalogView::load(&catalog, filters).await;
            if let Some(err) = view.error() {
                bail!("{}", err);
            }
            view.set_query(search);
            let filters = view.filters();
            let visible = view.visible();
            println!(
                "Showing {} of {} models ({}, {})",
                visible.len(),
                view.fetched().len(),
                filters.tier.as_ref().map(Tier::label).unwrap_or("All Tiers"),
                filters.category.as_ref().map(Category::label).unwrap_or("All Categories")
            );
            for model in visible {
                print_summary(model);
            }
        }
        Commands::Model { name } => {
            let catalog = CatalogClient::new(&backend_url(&keys)?)?;
            let model = catalog
                .fetch_model(&name)
                .await
                .map_err(|e| anyhow!(e.user_message("Failed to load model")))?;
            print_summary(&model);
            print_info(Some(&model));
            match PlaygroundKind::for_category(model.category) {
                Some(kind) => println!(
                    "Open in {}: modeldeck play --model {}",
                    kind.label(),
                    model.base_model
                ),
                None => println!(
                    "No playground available for {} models yet",
                    model.category.label()
                ),
            }
        }
        Commands::Play { model, out } => {
            let base = backend_url(&keys)?;
            let selection = select_model(&base, &model)
                .await?
                .ok_or_else(|| anyhow!("model '{}' not found in catalog", model))?;
            let category = selection.category;
            let Some(mut playground) = Playground::open(selection) else {
                bail!("No playground available for {} models yet", category.label());
            };
            let client = PlaygroundClient::new(&base)?;

            println!("{}", playground.kind().label());
            print_header(&playground.header());
            warn_if_no_key(&keys);
            match &mut playground {
                Playground::Text(view) => run_chat(view, &client, &keys).await?,
                Playground::Image(view) => run_image(view, &client, &keys).await?,
                Playground::Audio(view) => run_audio(view, &client, &keys, &out).await?,
            }
        }
        Commands::Chat {
            model,
            temperature,
            max_tokens,
        } => {
            let base = backend_url(&keys)?;
            let selection = select_model(&base, &model).await?;
            let client = PlaygroundClient::new(&base)?;

            warn_on_mismatch(PlaygroundKind::Text, selection.as_ref());
            let mut view = TextPlayground::new(selection);
            view.options.temperature = temperature;
            view.options.max_tokens = max_tokens;
            print_header(&view.header());
            warn_if_no_key(&keys);
            run_chat(&mut view, &client, &keys).await?;
        }
        Commands::Image {
            model,
            prompt,
            size,
            n,
        } => {
            let base = backend_url(&keys)?;
            let selection = select_model(&base, &model).await?;
            let client = PlaygroundClient::new(&base)?;

            warn_on_mismatch(PlaygroundKind::Image, selection.as_ref());
            let mut view = ImagePlayground::new(selection);
            view.prompt = prompt;
            view.options.size = size;
            view.options.n = n;
            print_header(&view.header());
            println!("Generating...");
            let url = finish(view.submit(&client, &keys).await)?;
            println!("{}", url);
        }
        Commands::Transcribe { model, file } => {
            let base = backend_url(&keys)?;
            let selection = select_model(&base, &model).await?;
            let client = PlaygroundClient::new(&base)?;

            warn_on_mismatch(PlaygroundKind::Audio, selection.as_ref());
            let mut view = AudioPlayground::new(selection);
            if !view.is_transcription() {
                eprintln!("note: selected model is not marked as a transcription model");
            }
            print_header(&view.header());
            let audio = read_audio(&file).await?;
            println!("Processing...");
            let outcome = view.transcribe(&client, &keys, audio).await;
            if let AudioOutput::Transcript(text) = finish(outcome)? {
                println!("{}", text);
            }
        }
        Commands::Speak {
            model,
            input,
            voice,
            out,
        } => {
            let base = backend_url(&keys)?;
            let selection = select_model(&base, &model).await?;
            let client = PlaygroundClient::new(&base)?;

            warn_on_mismatch(PlaygroundKind::Audio, selection.as_ref());
            let mut view = AudioPlayground::new(selection);
            view.input = input;
            view.options.voice = voice;
            print_header(&view.header());
            println!("Processing...");
            if let AudioOutput::Speech(bytes) = finish(view.synthesize(&client, &keys).await)? {
                tokio::fs::write(&out, &bytes)
                    .await
                    .with_context(|| format!("write {} failed", out.display()))?;
                println!("Saved {} bytes to {}", bytes.len(), out.display());
            }
        }
        Commands::Serve { addr } => {
            server::run(&addr).await?;
        }
    }

    Ok(())
}

fn backend_url(keys: &KeyStore) -> Result<String> {
    config::resolve_backend_url(keys.connection()).context("resolve backend url failed")
}

/**
 * \brief 经目录视图选中模型；找不到时返回空选择，Playground 使用占位信息。
 */
async fn select_model(base: &str, name: &str) -> Result<Option<ModelDescriptor>> {
    let catalog = CatalogClient::new(base)?;
    let view = CatalogView::load(&catalog, CatalogFilters::default()).await;
    if let Some(err) = view.error() {
        eprintln!("warning: {}", err);
    }
    let selection = view.select(name);
    if selection.is_none() {
        eprintln!(
            "warning: model '{}' not found in catalog, continuing without a selection",
            name
        );
    }
    Ok(selection)
}

type InputLines = Lines<BufReader<Stdin>>;

/**
 * \brief 读取下一行输入；EOF 或 /exit 返回 None。
 */
async fn next_input(lines: &mut InputLines, text: &str) -> Result<Option<String>> {
    prompt(text);
    match lines.next_line().await? {
        Some(line) if line.trim() == "/exit" => Ok(None),
        other => Ok(other),
    }
}

async fn run_chat(
    view: &mut TextPlayground,
    client: &PlaygroundClient,
    keys: &KeyStore,
) -> Result<()> {
    println!("Type a message, /exit to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_input(&mut lines, "> ").await? {
        view.input = line;
        if !view.can_submit() {
            continue;
        }
        println!("Thinking...");
        if let Some(reply) = report(view.submit(client, keys).await) {
            println!("{}\n", reply);
        } else {
            view.input.clear();
        }
    }
    let turns = view
        .messages()
        .iter()
        .filter(|m| m.role == Role::User)
        .count();
    telemetry::log_event("cli.chat", &format!("session ended turns={}", turns));
    Ok(())
}

async fn run_image(
    view: &mut ImagePlayground,
    client: &PlaygroundClient,
    keys: &KeyStore,
) -> Result<()> {
    println!("Describe an image, /exit to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_input(&mut lines, "prompt> ").await? {
        view.prompt = line;
        println!("Generating...");
        if let Some(url) = report(view.submit(client, keys).await) {
            println!("{}\n", url);
        }
    }
    Ok(())
}

/**
 * \brief 转写模型逐行读取音频路径；其余音频模型逐行读取待合成文本。
 */
async fn run_audio(
    view: &mut AudioPlayground,
    client: &PlaygroundClient,
    keys: &KeyStore,
    out: &Path,
) -> Result<()> {
    let transcription = view.is_transcription();
    if transcription {
        println!("Enter an audio file path, /exit to quit.");
    } else {
        println!("Enter text to speak, /exit to quit.");
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_input(&mut lines, "audio> ").await? {
        let outcome = if transcription {
            let audio = match read_audio(Path::new(line.trim())).await {
                Ok(audio) => audio,
                Err(e) => {
                    eprintln!("{:#}", e);
                    continue;
                }
            };
            println!("Processing...");
            view.transcribe(client, keys, audio).await
        } else {
            view.input = line;
            println!("Processing...");
            view.synthesize(client, keys).await
        };
        match report(outcome) {
            Some(AudioOutput::Transcript(text)) => println!("{}\n", text),
            Some(AudioOutput::Speech(bytes)) => {
                tokio::fs::write(out, &bytes)
                    .await
                    .with_context(|| format!("write {} failed", out.display()))?;
                println!("Saved {} bytes to {}\n", bytes.len(), out.display());
            }
            None => {}
        }
    }
    Ok(())
}

/**
 * \brief 交互模式下打印提示，不中断会话。
 */
fn report<T>(outcome: Outcome<T>) -> Option<T> {
    match outcome {
        Outcome::Done(value) => Some(value),
        Outcome::NeedsKey(n) | Outcome::Failed(n) => {
            eprintln!("{}: {}", n.title, n.description);
            None
        }
        Outcome::Skipped => None,
    }
}

fn finish<T>(outcome: Outcome<T>) -> Result<T> {
    match outcome {
        Outcome::Done(value) => Ok(value),
        Outcome::Skipped => bail!("nothing to submit"),
        Outcome::NeedsKey(n) => {
            bail!("{}: {} Run: modeldeck key set <KEY>", n.title, n.description)
        }
        Outcome::Failed(n) => bail!("{}: {}", n.title, n.description),
    }
}

fn warn_on_mismatch(kind: PlaygroundKind, selection: Option<&ModelDescriptor>) {
    if let Some(model) = selection.filter(|m| !kind.accepts(Some(*m))) {
        eprintln!(
            "warning: {} is a {} model, try: modeldeck play --model {}",
            model.name,
            model.category.label(),
            model.base_model
        );
    }
}

fn warn_if_no_key(keys: &KeyStore) {
    if !keys.is_present() {
        eprintln!("warning: no API key set. Run: modeldeck key set <KEY>");
    }
}

fn print_summary(model: &ModelDescriptor) {
    println!(
        "{:<28} {:<10} {:<20} {}",
        model.name,
        model.tier.label(),
        model.category.label(),
        model.model_id()
    );
    if !model.description.is_empty() {
        println!("    {}", model.description);
    }
}

fn print_header(header: &Header) {
    match &header.tier {
        Some(tier) => println!("== {} [{}] ==", header.title, tier),
        None => println!("== {} ==", header.title),
    }
    if !header.description.is_empty() {
        println!("{}", header.description);
    }
}

fn print_info(selection: Option<&ModelDescriptor>) {
    for (label, value) in info_rows(selection) {
        println!("  {:<16} {}", label, value);
    }
}

fn prompt(text: &str) {
    use std::io::Write;
    print!("{}", text);
    std::io::stdout().flush().ok();
}

async fn read_audio(path: &Path) -> Result<AudioFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {} failed", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio")
        .to_string();
    Ok(AudioFile {
        mime_type: guess_mime(path).map(str::to_string),
        file_name,
        bytes,
    })
}

fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "mp3" | "mpga" | "mpeg" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" | "mp4" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        _ => return None,
    })
}
