//! sercrypt: host CLI for the serial crypto accelerator
//!
//! Commands:
//!   encrypt <file>            - stream a file through the MCU encrypt path
//!   decrypt <file>            - stream a ciphertext container back to plaintext
//!   verify <orig> <enc>       - decrypt on the device and compare to the original
//!   verify-container <file>   - offline structural check of a container
//!   auto <file>               - encrypt, decrypt back, and compare on the device
//!   monitor                   - tail raw MCU output on the serial line
//!   selftest                  - full round trip against the in-process simulator

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::RngCore;
use tracing::warn;

use scl_core::config::{SclConfig, SessionConfig};
use scl_core::{Operation, SessionParams, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use scl_link::{LineEvent, LineReader};
use scl_proto::{encrypted_chunk_sizes, split_container, verify_container};
use scl_session::{ChunkTransferSession, SessionOutcome};
use scl_sim::SimBehavior;

/// Well-known development key, matching the firmware's test vectors.
/// Production use must pass --key.
const DEV_KEY: [u8; KEY_SIZE] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sercrypt",
    version,
    about = "host driver for the serial AES accelerator",
    long_about = "sercrypt: stream files through an MCU crypto accelerator over a serial link"
)]
struct Cli {
    /// Path to sercrypt.toml configuration file
    #[arg(long, short = 'c', env = "SERCRYPT_CONFIG", default_value = "sercrypt.toml")]
    config: PathBuf,

    /// Serial device path (overrides config)
    #[arg(long, short = 'p', env = "SERCRYPT_PORT")]
    port: Option<String>,

    /// Baud rate (overrides config)
    #[arg(long)]
    baud: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file on the device
    Encrypt {
        /// Plaintext input file
        input: PathBuf,
        /// Output container path (default: <input>.enc)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// 128-bit key as 32 hex characters (default: development key)
        #[arg(long, short = 'k')]
        key: Option<String>,
        /// 128-bit nonce as 32 hex characters (default: random)
        #[arg(long)]
        nonce: Option<String>,
        /// Additional authenticated data bound to every chunk
        #[arg(long)]
        aad: Option<String>,
    },

    /// Decrypt a ciphertext container on the device
    Decrypt {
        /// Container input file (nonce prefix + tagged chunks)
        input: PathBuf,
        /// Output plaintext path (default: <input> without .enc, or <input>.dec)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// 128-bit key as 32 hex characters (default: development key)
        #[arg(long, short = 'k')]
        key: Option<String>,
        /// Additional authenticated data bound to every chunk
        #[arg(long)]
        aad: Option<String>,
    },

    /// Decrypt a container on the device and compare against the original
    Verify {
        /// Original plaintext file
        original: PathBuf,
        /// Encrypted container file
        encrypted: PathBuf,
        /// 128-bit key as 32 hex characters (default: development key)
        #[arg(long, short = 'k')]
        key: Option<String>,
        /// Additional authenticated data bound to every chunk
        #[arg(long)]
        aad: Option<String>,
    },

    /// Offline structural check of a ciphertext container
    #[command(name = "verify-container")]
    VerifyContainer {
        /// Container file to inspect
        file: PathBuf,
    },

    /// Full round trip: encrypt, decrypt the result, compare to the input
    Auto {
        input: PathBuf,
        /// 128-bit key as 32 hex characters (default: development key)
        #[arg(long, short = 'k')]
        key: Option<String>,
        /// Additional authenticated data bound to every chunk
        #[arg(long)]
        aad: Option<String>,
    },

    /// Tail raw MCU output (handshake prompts highlighted)
    Monitor,

    /// Round-trip a random buffer through the in-process simulator
    Selftest {
        /// Buffer size in bytes
        #[arg(long, default_value_t = 4 * 1024 + 123)]
        size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = SclConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(baud) = cli.baud {
        config.serial.baud = baud;
    }
    init_tracing(&config.serial.log_level);

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            key,
            nonce,
            aad,
        } => cmd_encrypt(&config, &input, output.as_deref(), key, nonce, aad),
        Commands::Decrypt {
            input,
            output,
            key,
            aad,
        } => cmd_decrypt(&config, &input, output.as_deref(), key, aad),
        Commands::Verify {
            original,
            encrypted,
            key,
            aad,
        } => cmd_verify(&config, &original, &encrypted, key, aad),
        Commands::VerifyContainer { file } => cmd_verify_container(&file),
        Commands::Auto { input, key, aad } => cmd_auto(&config, &input, key, aad),
        Commands::Monitor => cmd_monitor(&config),
        Commands::Selftest { size } => cmd_selftest(&config.session, size),
    }
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── Key / nonce / AAD parsing ─────────────────────────────────────────────────

fn parse_key(key: Option<String>) -> Result<[u8; KEY_SIZE]> {
    match key {
        Some(hex_str) => parse_hex_exact(&hex_str).context("parsing --key"),
        None => {
            warn!("no --key given; using the well-known development key");
            Ok(DEV_KEY)
        }
    }
}

fn parse_nonce(nonce: Option<String>) -> Result<[u8; NONCE_SIZE]> {
    match nonce {
        Some(hex_str) => parse_hex_exact(&hex_str).context("parsing --nonce"),
        None => {
            let mut nonce = [0u8; NONCE_SIZE];
            rand::thread_rng().fill_bytes(&mut nonce);
            tracing::debug!(nonce = %hex::encode(nonce), "generated random session nonce");
            Ok(nonce)
        }
    }
}

fn parse_hex_exact<const N: usize>(hex_str: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(hex_str.trim()).context("invalid hex")?;
    if bytes.len() != N {
        bail!(
            "expected {} hex characters ({N} bytes), got {}",
            N * 2,
            bytes.len()
        );
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn aad_bytes(aad: Option<String>) -> Vec<u8> {
    aad.map(String::into_bytes).unwrap_or_default()
}

// ── Session plumbing ──────────────────────────────────────────────────────────

/// Open the serial port and drive one session with a progress bar.
fn run_device_session(
    config: &SclConfig,
    params: &SessionParams,
    input: &[u8],
    label: &str,
) -> Result<SessionOutcome> {
    let mut chan = scl_link::serial::open(&config.serial)
        .with_context(|| format!("opening serial port {}", config.serial.port))?;

    let pb = make_progress_bar(input.len() as u64, label);
    let pb_clone = pb.clone();
    let mut progress = move |sent: u64, total: u64| {
        pb_clone.set_length(total);
        pb_clone.set_position(sent);
    };

    let outcome = ChunkTransferSession::new(&mut chan, &config.session)
        .run(params, input, Some(&mut progress))
        .with_context(|| format!("{label} session failed"))?;
    pb.finish_and_clear();

    print_report(&outcome);
    Ok(outcome)
}

fn print_report(outcome: &SessionOutcome) {
    let r = &outcome.report;
    println!(
        "{} chunk(s), {} bytes out, {} bytes back in {:.1}s",
        r.chunks,
        r.bytes_sent,
        r.bytes_received,
        outcome.elapsed.as_secs_f64()
    );
    for (index, reason) in &r.degraded {
        println!("  warning: chunk {index} degraded ({reason})");
    }
    if r.short_stream {
        println!("  note: device ended the stream early");
    }
    if let Some(summary) = &outcome.finish.summary {
        println!("  device: {summary}");
    }
}

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── `sercrypt encrypt` ────────────────────────────────────────────────────────

fn cmd_encrypt(
    config: &SclConfig,
    input: &Path,
    output: Option<&Path>,
    key: Option<String>,
    nonce: Option<String>,
    aad: Option<String>,
) -> Result<()> {
    let plaintext =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let params = SessionParams::new(Operation::Encrypt, parse_key(key)?, parse_nonce(nonce)?)
        .with_aad(aad_bytes(aad))
        .with_capabilities(config.session.capabilities);

    let outcome = run_device_session(config, &params, &plaintext, "encrypt")?;

    let out_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| with_suffix(input, ".enc"));
    std::fs::write(&out_path, &outcome.artifact)
        .with_context(|| format!("writing {}", out_path.display()))?;
    println!(
        "encrypted {} -> {} ({} bytes)",
        input.display(),
        out_path.display(),
        outcome.artifact.len()
    );
    Ok(())
}

// ── `sercrypt decrypt` ────────────────────────────────────────────────────────

fn cmd_decrypt(
    config: &SclConfig,
    input: &Path,
    output: Option<&Path>,
    key: Option<String>,
    aad: Option<String>,
) -> Result<()> {
    let artifact = decrypt_container(config, input, key, aad)?;

    let out_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_decrypt_path(input));
    std::fs::write(&out_path, &artifact)
        .with_context(|| format!("writing {}", out_path.display()))?;
    println!(
        "decrypted {} -> {} ({} bytes)",
        input.display(),
        out_path.display(),
        artifact.len()
    );
    Ok(())
}

/// Read a container, run the device decrypt session, return the plaintext.
fn decrypt_container(
    config: &SclConfig,
    input: &Path,
    key: Option<String>,
    aad: Option<String>,
) -> Result<Vec<u8>> {
    let container =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    verify_container(&container)
        .with_context(|| format!("{} is not a valid container", input.display()))?;
    let (nonce, body) = split_container(&container)?;

    let params = SessionParams::new(Operation::Decrypt, parse_key(key)?, nonce)
        .with_aad(aad_bytes(aad))
        .with_capabilities(config.session.capabilities);

    let outcome = run_device_session(config, &params, body, "decrypt")?;
    Ok(outcome.artifact)
}

// ── `sercrypt verify` ─────────────────────────────────────────────────────────

fn cmd_verify(
    config: &SclConfig,
    original: &Path,
    encrypted: &Path,
    key: Option<String>,
    aad: Option<String>,
) -> Result<()> {
    let expected =
        std::fs::read(original).with_context(|| format!("reading {}", original.display()))?;
    let decrypted = decrypt_container(config, encrypted, key, aad)?;

    match first_difference(&expected, &decrypted) {
        None => {
            println!(
                "OK: {} decrypts to {} ({} bytes)",
                encrypted.display(),
                original.display(),
                expected.len()
            );
            Ok(())
        }
        Some(offset) => bail!(
            "MISMATCH: {} vs {}: first difference at byte {offset} \
             (original {} bytes, decrypted {} bytes)",
            encrypted.display(),
            original.display(),
            expected.len(),
            decrypted.len()
        ),
    }
}

/// Byte offset of the first difference, `None` when equal.
fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    if a == b {
        return None;
    }
    Some(
        a.iter()
            .zip(b.iter())
            .position(|(x, y)| x != y)
            .unwrap_or_else(|| a.len().min(b.len())),
    )
}

// ── `sercrypt verify-container` ───────────────────────────────────────────────

fn cmd_verify_container(file: &Path) -> Result<()> {
    let container = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    verify_container(&container)
        .with_context(|| format!("{} failed the structural check", file.display()))?;

    let (_, body) = split_container(&container)?;
    let sizes = encrypted_chunk_sizes(body.len());
    let plaintext_len = body.len() - sizes.len() * TAG_SIZE;
    println!(
        "{}: {} bytes, {} chunk(s), {} plaintext bytes",
        file.display(),
        container.len(),
        sizes.len(),
        plaintext_len
    );
    Ok(())
}

// ── `sercrypt auto` ───────────────────────────────────────────────────────────

fn cmd_auto(
    config: &SclConfig,
    input: &Path,
    key: Option<String>,
    aad: Option<String>,
) -> Result<()> {
    let plaintext =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let key_bytes = parse_key(key)?;
    let aad = aad_bytes(aad);

    let enc_params = SessionParams::new(Operation::Encrypt, key_bytes, parse_nonce(None)?)
        .with_aad(aad.clone())
        .with_capabilities(config.session.capabilities);
    let encrypted = run_device_session(config, &enc_params, &plaintext, "encrypt")?;

    let out_path = with_suffix(input, ".enc");
    std::fs::write(&out_path, &encrypted.artifact)
        .with_context(|| format!("writing {}", out_path.display()))?;
    println!("container written to {}", out_path.display());

    // Second session: the device resets when the port reopens.
    let (nonce, body) = split_container(&encrypted.artifact)?;
    let dec_params = SessionParams::new(Operation::Decrypt, key_bytes, nonce)
        .with_aad(aad)
        .with_capabilities(config.session.capabilities);
    let decrypted = run_device_session(config, &dec_params, body, "decrypt")?;

    match first_difference(&plaintext, &decrypted.artifact) {
        None => {
            println!("round trip OK ({} bytes)", plaintext.len());
            Ok(())
        }
        Some(offset) => bail!("round trip FAILED: first difference at byte {offset}"),
    }
}

// ── `sercrypt monitor` ────────────────────────────────────────────────────────

fn cmd_monitor(config: &SclConfig) -> Result<()> {
    let chan = scl_link::serial::open_with_poll(&config.serial, Duration::from_millis(50))
        .with_context(|| format!("opening serial port {}", config.serial.port))?;
    println!(
        "monitoring {} at {} baud (Ctrl-C to exit)",
        config.serial.port, config.serial.baud
    );

    let reader = LineReader::spawn(chan);
    loop {
        match reader.recv(Duration::from_secs(1)) {
            Some(LineEvent::Line(line)) => println!("  {line}"),
            Some(LineEvent::Prompt(line)) => println!("> {line}"),
            Some(LineEvent::Disconnected(reason)) => {
                println!("disconnected: {reason}");
                return Ok(());
            }
            None => {} // quiet line, keep listening
        }
    }
}

// ── `sercrypt selftest` ───────────────────────────────────────────────────────

fn cmd_selftest(session_config: &SessionConfig, size: usize) -> Result<()> {
    let mut plaintext = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut plaintext);
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    println!("selftest: {size} byte round trip through the simulator");

    let behavior = SimBehavior {
        chunk_size: session_config.chunk_size,
        capabilities: session_config.capabilities,
        ..SimBehavior::default()
    };

    let enc_params = SessionParams::new(Operation::Encrypt, DEV_KEY, nonce)
        .with_aad(b"selftest".to_vec())
        .with_capabilities(session_config.capabilities);
    let container = sim_session(session_config, behavior.clone(), &enc_params, &plaintext)
        .context("simulated encrypt failed")?;
    println!("  encrypt: {} -> {} bytes", plaintext.len(), container.len());

    let (nonce, body) = split_container(&container)?;
    let dec_params = SessionParams::new(Operation::Decrypt, DEV_KEY, nonce)
        .with_aad(b"selftest".to_vec())
        .with_capabilities(session_config.capabilities);
    let decrypted = sim_session(session_config, behavior, &dec_params, body)
        .context("simulated decrypt failed")?;
    println!("  decrypt: {} -> {} bytes", body.len(), decrypted.len());

    if decrypted != plaintext {
        bail!("selftest FAILED: decrypted output differs from the input");
    }
    println!("selftest passed");
    Ok(())
}

fn sim_session(
    session_config: &SessionConfig,
    behavior: SimBehavior,
    params: &SessionParams,
    input: &[u8],
) -> Result<Vec<u8>> {
    let (mut host, mcu) = scl_sim::spawn(behavior, Duration::from_millis(1));
    let outcome = ChunkTransferSession::new(&mut host, session_config).run(params, input, None)?;
    drop(host);
    mcu.join()?;
    Ok(outcome.artifact)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// `<file>.enc` becomes `<file>`; anything else gains `.dec`.
fn default_decrypt_path(input: &Path) -> PathBuf {
    let s = input.as_os_str().to_string_lossy();
    match s.strip_suffix(".enc") {
        Some(stripped) if !stripped.is_empty() => PathBuf::from(stripped),
        _ => with_suffix(input, ".dec"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_key_parses_exactly() {
        let key: [u8; 16] = parse_hex_exact("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(key[1], 0x01);
        assert!(parse_hex_exact::<16>("0001").is_err());
        assert!(parse_hex_exact::<16>("zz").is_err());
    }

    #[test]
    fn decrypt_path_strips_enc_suffix() {
        assert_eq!(
            default_decrypt_path(Path::new("photo.jpg.enc")),
            PathBuf::from("photo.jpg")
        );
        assert_eq!(
            default_decrypt_path(Path::new("blob.bin")),
            PathBuf::from("blob.bin.dec")
        );
    }

    #[test]
    fn encrypt_path_appends_suffix() {
        assert_eq!(
            with_suffix(Path::new("photo.jpg"), ".enc"),
            PathBuf::from("photo.jpg.enc")
        );
    }

    #[test]
    fn first_difference_pinpoints_the_byte() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        // Common prefix, different length
        assert_eq!(first_difference(b"abc", b"abcd"), Some(3));
    }

    #[test]
    fn verify_container_checks_real_files() {
        let dir = tempfile::tempdir().unwrap();

        // 16-byte nonce + one 1040-byte chunk
        let good = dir.path().join("blob.enc");
        std::fs::write(&good, vec![0u8; 1056]).unwrap();
        cmd_verify_container(&good).unwrap();

        // nonce alone is not a container
        let truncated = dir.path().join("short.enc");
        std::fs::write(&truncated, vec![0u8; 16]).unwrap();
        assert!(cmd_verify_container(&truncated).is_err());

        assert!(cmd_verify_container(&dir.path().join("missing.enc")).is_err());
    }
}
