use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use funnel::engine::{FeedSummary, feed_input};
use funnel::{Funnel, FunnelConfig, Scope};
use std::io::{self, BufReader, Read};
use std::thread;
use std::time::{Duration, Instant};

/// Reader that blocks until the test sends bytes; EOF once the sender is dropped.
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() {
            match self.rx.recv() {
                Ok(bytes) => self.buf = bytes,
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.drain(..n);
        Ok(n)
    }
}

fn channel_input() -> (Sender<Vec<u8>>, BufReader<ChannelReader>) {
    let (tx, rx) = unbounded();
    (
        tx,
        BufReader::new(ChannelReader {
            rx,
            buf: Vec::new(),
        }),
    )
}

fn collecting_funnel() -> (Funnel<String>, funnel::Closer<String>, Receiver<String>) {
    let (seen_tx, seen_rx) = unbounded::<String>();
    let (f, closer) = Funnel::new(
        FunnelConfig::new(move |item: String, _: &Scope| -> anyhow::Result<()> {
            let _ = seen_tx.send(item);
            Ok(())
        })
        .with_workers(2),
    )
    .unwrap();
    (f, closer, seen_rx)
}

// --- feed_input ---

#[test]
fn test_feed_skips_blank_lines_until_eof() {
    let (f, closer, seen) = collecting_funnel();
    let (data_tx, reader) = channel_input();
    let (_interrupt_tx, interrupt_rx) = bounded::<()>(1);
    data_tx.send(b"x\n\n   \ny\r\n".to_vec()).unwrap();
    drop(data_tx);

    let summary = feed_input(&f, Box::new(reader), &interrupt_rx).unwrap();
    assert_eq!(
        summary,
        FeedSummary {
            submitted: 2,
            interrupted: false
        }
    );
    closer.close();
    let mut items: Vec<String> = seen.try_iter().collect();
    items.sort();
    assert_eq!(items, vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn test_interrupt_while_input_blocked() {
    let (f, closer, seen) = collecting_funnel();
    // The writer stays open, so the reader blocks after the first line.
    let (data_tx, reader) = channel_input();
    let (interrupt_tx, interrupt_rx) = bounded::<()>(1);
    data_tx.send(b"first\n".to_vec()).unwrap();

    let h = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        interrupt_tx.send(()).unwrap();
    });
    let start = Instant::now();
    let summary = feed_input(&f, Box::new(reader), &interrupt_rx).unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(summary.interrupted);
    assert_eq!(summary.submitted, 1);
    h.join().unwrap();

    closer.close();
    assert_eq!(seen.try_iter().collect::<Vec<_>>(), vec!["first".to_string()]);
    drop(data_tx);
}
