//! Line blaster: floods a running source with newline-delimited text and
//! counts the acknowledgements coming back.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Instant;

fn main() -> io::Result<()> {
    let mut args = std::env::args().skip(1);

    let Some(addr) = args.next() else {
        eprintln!("Usage: blast <host:port> [lines] [line_len]");
        eprintln!("  lines     number of lines to send (default 10000)");
        eprintln!("  line_len  characters per line, newline included (default 100)");
        std::process::exit(1);
    };

    let lines: u64 = parse_arg(args.next(), 10_000, "lines");
    let line_len: usize = parse_arg(args.next(), 100, "line_len");

    let stream = TcpStream::connect(&addr)?;
    let reader_stream = stream.try_clone()?;

    // Acks are consumed on a separate thread so a full send buffer on either
    // side cannot deadlock the run.
    let reader = std::thread::spawn(move || -> io::Result<(u64, u64)> {
        let mut ok = 0u64;
        let mut failed = 0u64;
        for line in BufReader::new(reader_stream).lines() {
            let line = line?;
            if line == "OK" {
                ok += 1;
            } else {
                failed += 1;
            }
        }
        Ok((ok, failed))
    });

    let mut line = "x".repeat(line_len.saturating_sub(1));
    line.push('\n');
    let payload = line.into_bytes();

    let start = Instant::now();
    let mut w = BufWriter::new(stream);
    for _ in 0..lines {
        w.write_all(&payload)?;
    }
    w.flush()?;
    w.into_inner()?.shutdown(Shutdown::Write)?;

    let (ok, failed) = reader
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "reader thread panicked"))??;
    let elapsed = start.elapsed();

    println!(
        "sent {} lines of {} chars in {:.3}s ({:.0} lines/s)",
        lines,
        line_len,
        elapsed.as_secs_f64(),
        lines as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("acks: {} OK, {} FAILED", ok, failed);
    Ok(())
}

fn parse_arg<T: std::str::FromStr>(arg: Option<String>, default: T, what: &str) -> T {
    match arg {
        None => default,
        Some(s) => s.parse().unwrap_or_else(|_| {
            eprintln!("bad value for {}: {}", what, s);
            std::process::exit(1);
        }),
    }
}
