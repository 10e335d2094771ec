mod config;
mod history_store;
mod prompt;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::Resampler;
use tracing_subscriber::fmt::time::ChronoLocal;

use rio_core::alarm::{AlarmEvent, AlarmScheduler};
use rio_core::media::IptvClient;
use rio_core::playback::AudioClock;
use rio_core::search::SearchClient;
use rio_core::session::{Orchestrator, OrchestratorChannels, SessionInput};
use rio_core::tools::{ToolDispatcher, function_declarations};
use rio_core::wake::WakeWordGate;
use rio_core::{ClientCommand, PlaybackCommand, UiCommand};
use rio_live_types::SessionConfig;
use rio_live_types::audio::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, Voice};
use rio_live_utils::audio as audio_utils;

use crate::config::{Config, INPUT_CHUNK_SIZE, OUTPUT_CHUNK_SIZE, OUTPUT_LATENCY_MS};
use crate::history_store::FileHistoryStore;

#[derive(Parser)]
struct Cli {
    /// Override the wake phrase from the command line.
    #[arg(long)]
    wake_word: Option<String>,
    /// Override where chat history is stored.
    #[arg(long)]
    history: Option<PathBuf>,
}

/// Output-device clock: seconds of audio actually played so far.
struct PlaybackClock {
    played_frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioClock for PlaybackClock {
    fn now(&self) -> f64 {
        self.played_frames.load(Ordering::Relaxed) as f64 / self.sample_rate
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting Rio service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    if let Some(wake_word) = args.wake_word {
        config.profile.wake_word = Some(wake_word);
    }
    if let Some(history) = args.history {
        config.history_path = history;
    }

    // --- 4. Channels between the runtime tasks ---
    let (input_tx, mut input_rx) = tokio::sync::mpsc::channel::<SessionInput>(1024);
    let (ui_tx, mut ui_rx) = tokio::sync::mpsc::channel::<UiCommand>(256);
    let (client_cmd_tx, mut client_cmd_rx) = tokio::sync::mpsc::channel::<ClientCommand>(1024);
    let (playback_tx, mut playback_rx) = tokio::sync::mpsc::channel::<PlaybackCommand>(256);
    let (alarm_tx, mut alarm_rx) = tokio::sync::mpsc::channel::<AlarmEvent>(64);

    // --- 5. Audio input ---
    let host = cpal::default_host();
    let input = host
        .default_input_device()
        .context("Failed to get default audio input device")?;
    tracing::info!("Using input device: {:?}", input.name()?);

    let input_config = input
        .default_input_config()
        .context("Failed to get default input config")?;
    let input_config = StreamConfig {
        channels: input_config.channels(),
        sample_rate: input_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let input_channel_count = input_config.channels as usize;
    let input_sample_rate = input_config.sample_rate.0 as f64;
    tracing::info!("Input stream config: {:?}", &input_config);

    let (mic_tx, mut mic_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(1024);

    // The input callback downmixes to mono and hands the chunk to the mic
    // task. try_send keeps the audio thread free of backpressure stalls.
    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let audio = if input_channel_count > 1 {
            data.chunks(input_channel_count)
                .map(|frame| frame.iter().sum::<f32>() / input_channel_count as f32)
                .collect::<Vec<f32>>()
        } else {
            data.to_vec()
        };
        if let Err(e) = mic_tx.try_send(audio) {
            tracing::warn!("Failed to send audio data to buffer: {:?}", e);
        }
    };
    let input_stream = input.build_input_stream(
        &input_config,
        input_data_fn,
        move |err| tracing::error!("An error occurred on input stream: {}", err),
        None,
    )?;
    input_stream.play()?;

    // The mic task resamples captured audio to the session rate and feeds
    // the orchestrator, preserving capture order.
    let mic_input_tx = input_tx.clone();
    let mut in_resampler =
        audio_utils::create_resampler(input_sample_rate, INPUT_SAMPLE_RATE, INPUT_CHUNK_SIZE)?;
    let mic_task = tokio::spawn(async move {
        let mut buffer: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);
        while let Some(audio) = mic_rx.recv().await {
            buffer.extend(audio);
            while buffer.len() >= INPUT_CHUNK_SIZE {
                let chunk: Vec<f32> = buffer.drain(..INPUT_CHUNK_SIZE).collect();
                let Ok(resampled) = in_resampler.process(&[chunk.as_slice()], None) else {
                    tracing::warn!("Failed to resample microphone chunk");
                    continue;
                };
                let Some(resampled) = resampled.into_iter().next() else {
                    continue;
                };
                if resampled.is_empty() {
                    continue;
                }
                if let Err(e) = mic_input_tx.send(SessionInput::Audio(resampled)).await {
                    tracing::warn!("Failed to forward microphone chunk: {:?}", e);
                    return;
                }
            }
        }
    });

    // --- 6. Audio output ---
    let output = host
        .default_output_device()
        .context("Failed to get default audio output device")?;
    tracing::info!("Using output device: {:?}", output.name()?);

    let output_config = output
        .default_output_config()
        .context("Failed to get default output config")?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let output_channel_count = output_config.channels as usize;
    let output_sample_rate = output_config.sample_rate.0 as f64;
    tracing::info!("Output stream config: {:?}", &output_config);

    let audio_out_buffer = audio_utils::shared_buffer(
        output_sample_rate as usize * OUTPUT_LATENCY_MS / 1000 * 2,
    );
    let (mut audio_out_tx, mut audio_out_rx) = audio_out_buffer.split();

    let played_frames = Arc::new(AtomicU64::new(0));
    let flush_requested = Arc::new(AtomicBool::new(false));

    let played_frames_cb = played_frames.clone();
    let flush_requested_cb = flush_requested.clone();
    // The output callback drains the ring buffer into the device and keeps
    // the playback clock ticking. An interruption flushes everything queued.
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        if flush_requested_cb.swap(false, Ordering::AcqRel) {
            while audio_out_rx.try_pop().is_some() {}
        }
        let mut sample_index = 0;
        while sample_index < data.len() {
            let sample = audio_out_rx.try_pop().unwrap_or(0.0);
            // Left channel (ch:0).
            data[sample_index] = sample;
            sample_index += 1;
            // Right channel (ch:1), if it exists.
            if output_channel_count > 1 && sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // Ignore other channels.
            sample_index += output_channel_count.saturating_sub(2);
        }
        let frames = (data.len() / output_channel_count.max(1)) as u64;
        played_frames_cb.fetch_add(frames, Ordering::Relaxed);
    };
    let output_stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("An error occurred on output stream: {}", err),
        None,
    )?;
    output_stream.play()?;

    // The playback task executes scheduled chunks in cursor order: resample
    // to the device rate, push into the ring buffer, report completion.
    let playback_input_tx = input_tx.clone();
    let mut out_resampler =
        audio_utils::create_resampler(OUTPUT_SAMPLE_RATE, output_sample_rate, 100)?;
    let playback_task = tokio::spawn(async move {
        while let Some(command) = playback_rx.recv().await {
            match command {
                PlaybackCommand::Play {
                    samples, source, ..
                } => {
                    let chunk_size = out_resampler.input_frames_next();
                    for chunk in audio_utils::split_for_chunks(&samples, chunk_size) {
                        if let Ok(resampled) = out_resampler.process(&[chunk.as_slice()], None) {
                            if let Some(resampled) = resampled.first() {
                                for sample in resampled {
                                    if let Err(e) = audio_out_tx.try_push(*sample) {
                                        tracing::warn!(
                                            "Failed to push samples to buffer: {:?}",
                                            e
                                        );
                                    }
                                }
                            }
                        }
                    }
                    if let Err(e) = playback_input_tx
                        .send(SessionInput::PlaybackEnded(source))
                        .await
                    {
                        tracing::warn!("Failed to report playback end: {:?}", e);
                        return;
                    }
                }
                PlaybackCommand::StopAll => {
                    flush_requested.store(true, Ordering::Release);
                }
            }
        }
    });

    // --- 7. Alarm subsystem ---
    let alarms = AlarmScheduler::new(alarm_tx);
    let alarm_input_tx = input_tx.clone();
    let alarm_task = tokio::spawn(async move {
        while let Some(event) = alarm_rx.recv().await {
            let input = match event {
                AlarmEvent::Ring { id, label, kind } => SessionInput::AlarmRing { id, label, kind },
                AlarmEvent::StateRequest { state, status } => {
                    SessionInput::AlarmState { state, status }
                }
            };
            if alarm_input_tx.send(input).await.is_err() {
                return;
            }
        }
    });

    // --- 8. Live session connection ---
    let live_config = rio_live::Config::builder()
        .with_api_key(&config.gemini_api_key)
        .build();
    let mut client = rio_live::connect_with_config(1024, live_config)
        .await
        .map_err(|e| anyhow!(e))
        .context("Failed to connect to the live session service")?;

    // Subscribe before declaring the session so the setup acknowledgement
    // cannot slip past the event pump.
    let mut server_events = client
        .server_events()
        .await
        .map_err(|e| anyhow!(e))
        .context("Failed to get server events channel")?;

    let session_config = SessionConfig::builder()
        .with_system_instruction(&prompt::build_system_instruction(&config.profile))
        .with_modalities_audio_only()
        .with_voice(Voice::from_name(&config.profile.voice_name()).unwrap_or(Voice::Zephyr))
        .with_input_audio_transcription_enable()
        .with_output_audio_transcription_enable()
        .with_tools(function_declarations())
        .build();
    client
        .setup(session_config)
        .await
        .map_err(|e| anyhow!(e))
        .context("Failed to declare the session configuration")?;

    let server_input_tx = input_tx.clone();
    let server_task = tokio::spawn(async move {
        loop {
            match server_events.recv().await {
                Ok(event) => {
                    if server_input_tx
                        .send(SessionInput::Server(event))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("server event stream lagged by {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    // Outbound half: executes the orchestrator's client commands.
    let client_task = tokio::spawn(async move {
        while let Some(command) = client_cmd_rx.recv().await {
            match command {
                ClientCommand::Audio(audio) => {
                    if let Err(e) = client.append_audio(audio).await {
                        tracing::error!("Failed to send audio buffer: {}", e);
                    }
                }
                ClientCommand::ToolResponse { id, name, result } => {
                    if let Err(e) = client.send_tool_response(id, name, result).await {
                        tracing::error!("Failed to send tool response: {}", e);
                    }
                }
                ClientCommand::Close => {
                    tracing::info!("closing live session connection");
                    return;
                }
            }
        }
    });

    // --- 9. Session orchestrator ---
    let wake_phrase = config.profile.wake_phrase();
    let gate = WakeWordGate::new(&wake_phrase, INPUT_SAMPLE_RATE as u32);
    // No offline recognizer is bundled with the service binary; the
    // transcript-scan fallback detector carries activation until one is
    // attached.
    tracing::warn!("offline wake gate unavailable; relying on transcript matching");

    let search = Arc::new(SearchClient::new(
        config.gemini_api_key.clone(),
        config.search_model.clone(),
    ));
    let media = Arc::new(IptvClient::new(config.playlist_url.clone()));
    let dispatcher = ToolDispatcher::new(search, media, alarms, ui_tx.clone());
    let history = Arc::new(FileHistoryStore::new(config.history_path.clone()));
    let clock = Box::new(PlaybackClock {
        played_frames,
        sample_rate: output_sample_rate,
    });

    let mut orchestrator = Orchestrator::new(
        config.profile.clone(),
        gate,
        dispatcher,
        history,
        clock,
        OrchestratorChannels {
            ui_tx,
            client_tx: client_cmd_tx.clone(),
            playback_tx,
            self_tx: input_tx.clone(),
        },
    );
    orchestrator.start().await?;

    let orchestrator_task = tokio::spawn(async move {
        while let Some(input) = input_rx.recv().await {
            if let Err(e) = orchestrator.handle_input(input).await {
                tracing::error!("Error in session orchestrator: {:?}", e);
            }
        }
    });

    // --- 10. UI command sink ---
    // The rendering layer lives outside this binary: commands are surfaced
    // on the log so an embedder can watch the session.
    let ui_task = tokio::spawn(async move {
        while let Some(command) = ui_rx.recv().await {
            match command {
                UiCommand::StateChange { state, status } => match status {
                    Some(status) => tracing::info!("state => {:?} ({})", state, status),
                    None => tracing::info!("state => {:?}", state),
                },
                UiCommand::HistoryUpdate(turns) => {
                    tracing::info!("history => {} turns", turns.len());
                }
                UiCommand::TranscriptionUpdate(Some(turn)) => {
                    tracing::info!("{:?}: {}", turn.speaker, turn.text);
                }
                UiCommand::TranscriptionUpdate(None) => {}
                UiCommand::PlayChannel(channel) => {
                    tracing::info!("play channel {} ({})", channel.name, channel.url);
                }
                UiCommand::ResumeMedia => tracing::info!("resume suspended media"),
                UiCommand::PlayVideo { id, title } => {
                    tracing::info!("play video {:?} ({})", title, id);
                }
                UiCommand::SetVolume(level) => tracing::info!("volume => {}%", level),
                UiCommand::SetBrightness(level) => tracing::info!("brightness => {}%", level),
                UiCommand::SessionEnd => tracing::info!("session ended"),
            }
        }
    });

    tokio::select! {
        _ = mic_task => {},
        _ = playback_task => {},
        _ = alarm_task => {},
        _ = server_task => {},
        _ = client_task => {},
        _ = orchestrator_task => {},
        _ = ui_task => {},
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
            let _ = input_tx.send(SessionInput::Stop).await;
        }
    }
    tracing::info!("Shutting down...");
    Ok(())
}
