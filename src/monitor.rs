//! Stream monitor: feeds network or file input through the slicer and
//! reports every PSI section attempt on the configured PIDs as one
//! timestamped JSON object per line.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::warn;

use crate::network;
use crate::packet::TsRef;
use crate::psi::{PsiAssembler, PsiError};
use crate::slicer::{SliceStatus, Slicer};

pub struct Options {
    pub input: Input,
    /// PIDs to assemble sections from.
    pub pids: Vec<u16>,
}

pub enum Input {
    Udp(SocketAddr),
    File(PathBuf),
}

pub async fn run(opts: Options) -> anyhow::Result<()> {
    let mut monitor = Monitor::new(&opts.pids);

    match opts.input {
        Input::Udp(addr) => {
            let sock = network::create_udp_socket(addr)
                .with_context(|| format!("bind {addr}"))?;
            let mut buf = [0u8; 2048];
            loop {
                let n = sock.recv(&mut buf).await?;
                monitor.consume(Bytes::copy_from_slice(&buf[..n]));
            }
        }
        Input::File(path) => {
            let mut file = File::open(&path)
                .await
                .with_context(|| format!("open {}", path.display()))?;
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                monitor.consume(Bytes::copy_from_slice(&buf[..n]));
            }
            if monitor.slicer.status() == SliceStatus::Partial {
                warn!("input ended inside a packet");
            }
            Ok(())
        }
    }
}

struct Monitor {
    slicer: Slicer,
    assemblers: HashMap<u16, PsiAssembler>,
}

impl Monitor {
    fn new(pids: &[u16]) -> Monitor {
        Monitor {
            slicer: Slicer::new(),
            assemblers: pids
                .iter()
                .map(|&pid| (pid, PsiAssembler::new()))
                .collect(),
        }
    }

    fn consume(&mut self, chunk: Bytes) {
        let Monitor { slicer, assemblers } = self;

        for packet in slicer.feed(chunk) {
            let packet = TsRef::new(&packet);
            let pid = packet.pid();
            let Some(assembler) = assemblers.get_mut(&pid) else {
                continue;
            };
            assembler.assemble(packet, |psi, result| report(pid, psi, result));
        }

        if slicer.status() == SliceStatus::SyncLost {
            warn!("sync lost, dropped chunk remainder");
        }
    }
}

#[derive(Serialize)]
struct SectionReport {
    time: String,
    pid: u16,
    table_id: u8,
    version: u8,
    section_number: u8,
    last_section_number: u8,
    size: usize,
    crc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn report(pid: u16, psi: &PsiAssembler, result: Result<(), PsiError>) {
    if let Err(e) = &result {
        warn!(pid, error = %e, "section dropped");
    }

    let report = SectionReport {
        time: chrono::Utc::now().to_rfc3339(),
        pid,
        table_id: psi.table_id(),
        version: psi.version(),
        section_number: psi.section_number(),
        last_section_number: psi.last_section_number(),
        size: psi.payload().len(),
        crc: format!("{:#010X}", psi.crc()),
        error: result.err().map(|e| e.to_string()),
    };

    println!("{}", serde_json::to_string(&report).unwrap());
}
