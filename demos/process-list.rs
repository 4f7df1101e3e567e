//! Lists the processes of a guest captured in a raw memory image.
//!
//! ```text
//! process-list <IMAGE> <CONFIG> <DOMAIN> --cr3 <CR3> [--cr4 <CR4>]
//! ```
//!
//! Set `RUST_LOG=debug` to follow the session bootstrap.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use xa::{
    XaConfig, XaCore, XaOs as _, XaSession,
    arch::x86::{Cr0, Cr3, Cr4, Registers},
    driver::image::XaImageDriver,
    os::AnyOs,
};

const CR0_PE: u64 = 1 << 0;
const CR0_PG: u64 = 1 << 31;

#[derive(Parser, Debug)]
#[command(
    name = "process-list",
    about = "List the processes of a guest captured in a raw memory image"
)]
struct Args {
    /// Raw physical memory image of the guest
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// JSON configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Domain entry in the configuration
    #[arg(value_name = "DOMAIN")]
    domain: String,

    /// CR3 of the guest at capture time, in hexadecimal
    #[arg(long, value_parser = parse_hex)]
    cr3: u64,

    /// CR4 of the guest at capture time, in hexadecimal
    #[arg(long, value_parser = parse_hex, default_value = "0")]
    cr4: u64,
}

fn parse_hex(text: &str) -> Result<u64, std::num::ParseIntError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = XaConfig::from_path(&args.config)?;
    let domain = config.domain(&args.domain)?;

    let registers = Registers {
        cr0: Cr0(CR0_PG | CR0_PE),
        cr3: Cr3(args.cr3),
        cr4: Cr4(args.cr4),
    };

    // Setup the session.
    let driver = XaImageDriver::new(&args.image, registers)?;
    let core = XaCore::new(driver, domain.page_offset())?;
    let os = AnyOs::from_config(domain)?;
    let session = XaSession::new(core, os)?;

    tracing::info!(head = %session.process_list_head(), "listing processes");

    for process in session.processes() {
        let process = process?;
        let name = session.process_name(&process)?;

        let page_directory = match session
            .os()
            .process_page_directory(session.core(), &process)
        {
            Ok(page_directory) => page_directory.to_string(),
            Err(_) => String::from("-"),
        };

        println!(
            "[{:5}] {:16} object: {} pgd: {}",
            process.id().0,
            name,
            process.object(),
            page_directory
        );
    }

    Ok(())
}
