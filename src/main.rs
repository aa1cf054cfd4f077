use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use sathi_voice::chat::{ChatClient, ChatSession, Role};
use sathi_voice::voice::{
    AudioPlayer, EspeakSynthesizer, HttpSynthesizer, LocalSynthesizer, OutputSettings,
    PlaybackOutcome, RemoteSynthesizer, SpeechOutput, normalize, select_voice,
};
use sathi_voice::{Config, Language, detect_language};

/// Sathi - voice assistant for farmers
#[derive(Parser)]
#[command(name = "sathi", version, about)]
struct Cli {
    /// Conversation language (en, hi)
    #[arg(short, long, env = "SATHI_LANGUAGE")]
    language: Option<Language>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen once and print the transcript
    Listen,
    /// Speak text through the output pipeline
    Speak {
        /// Text to speak (markdown allowed)
        text: String,
        /// Skip the remote voice
        #[arg(long)]
        local_only: bool,
    },
    /// Chat with the assistant
    Chat {
        /// Take input from the microphone instead of the keyboard
        #[arg(long)]
        voice: bool,
        /// Speak each reply
        #[arg(long)]
        speak: bool,
    },
    /// Print text as it would be spoken
    Normalize {
        /// Text to normalize
        text: String,
    },
    /// List local voices and the ones that would be chosen
    Voices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,sathi=info,sathi_voice=info",
        1 => "info,sathi=debug,sathi_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    let explicit_language = cli.language;
    if let Some(language) = explicit_language {
        config.language = language;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Listen => {
            let text = listen_once(&config).await?;
            println!("{text}");
            Ok(())
        }
        Command::Speak { text, local_only } => {
            if local_only {
                config.synthesis.remote_enabled = false;
            }
            speak(&config, &text).await
        }
        Command::Chat { voice, speak } => chat(config, explicit_language, voice, speak).await,
        Command::Normalize { text } => {
            let normalized = normalize(&text);
            let language = detect_language(&normalized);
            println!("[{language}] {normalized}");
            Ok(())
        }
        Command::Voices => list_voices(&config).await,
    }
}

/// Build the speech output pipeline from config
fn build_output(config: &Config) -> anyhow::Result<SpeechOutput> {
    let local: Arc<dyn LocalSynthesizer> =
        Arc::new(EspeakSynthesizer::new(&config.synthesis.local_command)?);

    let remote: Option<Arc<dyn RemoteSynthesizer>> = if config.synthesis.remote_enabled {
        let timeout = std::time::Duration::from_secs(config.synthesis.remote_timeout_secs);
        let synthesizer = HttpSynthesizer::new(config.tts_url(), timeout)?
            .with_auth_token(config.api_token.clone());
        Some(Arc::new(synthesizer))
    } else {
        None
    };

    Ok(SpeechOutput::new(
        remote,
        local,
        speaker(),
        OutputSettings::from(&config.synthesis),
    ))
}

#[cfg(feature = "audio")]
fn speaker() -> Arc<dyn AudioPlayer> {
    Arc::new(sathi_voice::voice::SpeakerPlayer::new())
}

#[cfg(not(feature = "audio"))]
fn speaker() -> Arc<dyn AudioPlayer> {
    /// Rejects remote audio so output falls back to the local voice
    struct NoSpeaker;

    #[async_trait::async_trait]
    impl AudioPlayer for NoSpeaker {
        async fn play(
            &self,
            _audio: Vec<u8>,
            _cancel: sathi_voice::voice::PlaybackCancel,
        ) -> sathi_voice::Result<()> {
            Err(sathi_voice::Error::Audio("built without audio support".to_string()))
        }
    }

    Arc::new(NoSpeaker)
}

/// Speak text and report how it went
async fn speak(config: &Config, text: &str) -> anyhow::Result<()> {
    let output = build_output(config)?;

    match output.play_audio("cli", text).finished().await {
        PlaybackOutcome::Finished(tier) => {
            tracing::info!(?tier, "spoken");
            Ok(())
        }
        PlaybackOutcome::Skipped => {
            println!("Nothing to say.");
            Ok(())
        }
        PlaybackOutcome::Failed(message) => anyhow::bail!(message),
        PlaybackOutcome::Superseded => Ok(()),
    }
}

/// Run one listening interaction, returning the final transcript
#[cfg(feature = "audio")]
#[allow(clippy::future_not_send)]
async fn listen_once(config: &Config) -> anyhow::Result<String> {
    use std::time::Duration;

    use sathi_voice::voice::{
        CapturePolicy, Microphone, MicrophoneRecognizer, SpeechCapture, Transcriber,
    };

    let transcriber = Transcriber::from_config(&config.stt)?;
    let recognizer = MicrophoneRecognizer::new(
        Arc::new(Microphone),
        transcriber,
        Duration::from_secs(config.recognition.no_speech_window_secs),
    )?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Result<String, String>>();
    let error_tx = tx.clone();

    let mut capture = SpeechCapture::new(
        recognizer,
        config.language,
        move |text| {
            let _ = tx.send(Ok(text));
        },
        move |message| {
            let _ = error_tx.send(Err(message));
        },
    )
    .with_policy(CapturePolicy::from(&config.recognition));

    eprintln!("Listening ({})...", config.language);
    capture.start_listening();
    capture.run_until_idle().await;
    capture.dispose();

    match rx.try_recv() {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(message)) => anyhow::bail!(message),
        Err(_) => anyhow::bail!("listening ended without a transcript"),
    }
}

#[cfg(not(feature = "audio"))]
async fn listen_once(_config: &Config) -> anyhow::Result<String> {
    anyhow::bail!("built without audio support")
}

/// Interactive chat loop
#[allow(clippy::future_not_send)]
async fn chat(
    config: Config,
    explicit_language: Option<Language>,
    voice: bool,
    speak_replies: bool,
) -> anyhow::Result<()> {
    if voice && !cfg!(feature = "audio") {
        anyhow::bail!("voice input needs a build with audio support");
    }

    let client = ChatClient::new(&config.api_url).with_auth_token(config.api_token.clone());
    let mut session = ChatSession::restore(client, &config.data_dir, config.language)
        .with_language_override(explicit_language);
    let output = if speak_replies {
        Some(build_output(&config)?)
    } else {
        None
    };

    println!(
        "Sathi ({}). Commands: /lang en|hi, /crop <name>, /pest <description>, /history, /open <id>, /delete <id>, /clear, /quit",
        session.language()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let input = if voice {
            let mut listen_config = config.clone();
            listen_config.language = session.language();
            match listen_once(&listen_config).await {
                Ok(text) => {
                    println!("> {text}");
                    text
                }
                Err(e) => {
                    println!("{e}");
                    continue;
                }
            }
        } else {
            match lines.next_line().await? {
                Some(line) => line,
                None => break,
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let reply = match parse_command(input) {
            Some(("/quit", _)) => break,
            Some(("/clear", _)) => {
                session.clear_chat();
                println!("Started a new conversation.");
                continue;
            }
            Some(("/lang", arg)) => {
                match arg.parse::<Language>() {
                    Ok(language) => {
                        session.set_language(language);
                        println!("Language: {language}");
                    }
                    Err(e) => println!("{e}"),
                }
                continue;
            }
            Some(("/history", _)) => {
                match session.load_conversations().await {
                    Ok(conversations) => {
                        for c in conversations {
                            println!("{}  {} ({} messages)", c.id, c.preview, c.message_count);
                        }
                    }
                    Err(e) => println!("Could not load conversations: {e}"),
                }
                continue;
            }
            Some(("/open", id)) => {
                match session.load_conversation(id).await {
                    Ok(()) => {
                        for message in session.messages() {
                            let who = if message.role == Role::User { "you" } else { "sathi" };
                            println!("{who}: {}", message.content);
                        }
                    }
                    Err(e) => println!("Could not open conversation: {e}"),
                }
                continue;
            }
            Some(("/delete", id)) => {
                if let Err(e) = session.delete_conversation(id).await {
                    println!("Could not delete conversation: {e}");
                }
                continue;
            }
            Some(("/crop", crop)) => session.get_crop_advice(crop).await,
            Some(("/pest", description)) => session.analyze_pest(description, None).await,
            Some((other, _)) => {
                println!("Unknown command: {other}");
                continue;
            }
            None => session.send_message(input).await,
        };

        match reply {
            Ok(message) => {
                println!("sathi: {}", message.content);
                if let Some(output) = &output {
                    let outcome = output
                        .play_audio(message.id.clone(), &message.content)
                        .finished()
                        .await;
                    if let PlaybackOutcome::Failed(text) = outcome {
                        println!("{text}");
                    }
                }
            }
            Err(e) => println!("Sathi is unavailable right now: {e}"),
        }
    }

    Ok(())
}

/// Split `/command rest` into its parts
fn parse_command(input: &str) -> Option<(&str, &str)> {
    if !input.starts_with('/') {
        return None;
    }
    let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
    Some((command, rest.trim()))
}

/// Print the local voice catalog
async fn list_voices(config: &Config) -> anyhow::Result<()> {
    let local = EspeakSynthesizer::new(&config.synthesis.local_command)?;
    let voices = local.voices().await;
    let providers = &config.synthesis.preferred_providers;

    for language in [Language::En, Language::Hi] {
        let chosen = select_voice(&voices, language, providers)
            .map_or_else(|| "host default".to_string(), |v| format!("{} ({})", v.name, v.language_tag));
        println!("{language}: {chosen}");
    }
    println!("---");
    for voice in &voices {
        println!("{:<12} {}", voice.language_tag, voice.name);
    }

    Ok(())
}
