mod dispatch;

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep, timeout};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dispatch::{Dispatch, HandlerRegistry, TaskHandler, dispatch};
use tasksig_core::domain::{Arg, LegacySignature, Signature, SignatureError, TextMapWriter, chain};

struct SendEmail {
    remaining_failures: AtomicU32,
}

impl SendEmail {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl TaskHandler for SendEmail {
    async fn handle(&self, args: &[Arg]) -> Result<Vec<Arg>, String> {
        let to = args
            .iter()
            .find(|a| a.name() == "to")
            .and_then(|a| a.value().as_str())
            .ok_or("missing `to` argument")?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("intentional failure (left={left})"));
        }

        println!("sent email to {to}");
        Ok(vec![Arg::new("message_id", format!("msg-{to}"))])
    }
}

struct AuditLog;

#[async_trait]
impl TaskHandler for AuditLog {
    async fn handle(&self, args: &[Arg]) -> Result<Vec<Arg>, String> {
        let fields: Vec<_> = args
            .iter()
            .map(|a| format!("{}:{}={:?}", a.name(), a.type_tag(), a.value()))
            .collect();
        println!("audit: {}", fields.join(" "));
        Ok(vec![])
    }
}

/// worker：channel と dispatcher をつなぐ接着剤
async fn worker_loop(
    tx: mpsc::UnboundedSender<Signature>,
    mut rx: mpsc::UnboundedReceiver<Signature>,
    registry: Arc<HandlerRegistry>,
) -> Result<(), SignatureError> {
    // 一定時間なにも届かなければ終了（サンプルなので graceful shutdown は省略）
    while let Ok(Some(signature)) = timeout(Duration::from_millis(300), rx.recv()).await {
        let next = match dispatch(&registry, signature).await? {
            Dispatch::Succeeded(next) | Dispatch::Failed(next) => next,
            Dispatch::Retry(retry) => {
                sleep(Duration::from_secs(u64::from(retry.retry_timeout))).await;
                vec![retry]
            }
            Dispatch::Requeue(signature) => vec![signature],
            Dispatch::Dropped => vec![],
        };
        enqueue(&tx, next);
    }
    Ok(())
}

/// Push signatures back onto the queue. Returns how many were lost because
/// the receiving side is gone.
fn enqueue(tx: &mpsc::UnboundedSender<Signature>, next: Vec<Signature>) -> usize {
    let mut lost = 0;
    for signature in next {
        if let Err(mpsc::error::SendError(signature)) = tx.send(signature) {
            tracing::warn!(id = %signature.id, name = %signature.name, "queue closed, dropping signature");
            lost += 1;
        }
    }
    lost
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // (A) handler を登録
    let mut reg = HandlerRegistry::new();
    reg.register("email.send", Arc::new(SendEmail::new(1)))?;
    reg.register("audit.log", Arc::new(AuditLog))?;
    let reg = Arc::new(reg);

    let (tx, rx) = mpsc::unbounded_channel();

    // (B) current schema: email.send -> audit.log の chain
    let mut send = Signature::new("email.send", vec![Arg::new("to", "a@b.com")])?.with_retry(2, 0);
    TextMapWriter::set(&mut send.headers, "trace-id", "4bf92f3577b34da6");
    let head = chain(vec![send, Signature::new("audit.log", vec![])?])?;
    println!("enqueue: {}", serde_json::to_string(&head)?);
    tx.send(head)?;

    // (C) legacy schema の payload を変換してから投入（数値の header は落ちる）
    let legacy: LegacySignature = serde_json::from_value(serde_json::json!({
        "id": "task_legacy-1",
        "name": "audit.log",
        "args": [{"name": "source", "type": "string", "value": "legacy-producer"}],
        "headers": {"trace-id": "abc", "retries": 3}
    }))?;
    let converted = legacy.convert_to_current_schema()?;
    println!("converted headers: {}", serde_json::to_string(&converted.headers)?);
    tx.send(converted)?;

    // (D) handler のない task は ignore_when_unregistered なら捨てられる
    tx.send(Signature::new("thumbnail.render", vec![])?.with_ignore_when_unregistered(true))?;

    // (E) worker を起動し、キューが空になるまで待つ
    let worker = tokio::spawn(worker_loop(tx, rx, reg));
    worker.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_reports_signatures_lost_to_a_closed_queue() {
        let (tx, rx) = mpsc::unbounded_channel();
        let first = vec![Signature::new("audit.log", vec![]).unwrap()];
        assert_eq!(enqueue(&tx, first), 0);

        drop(rx);
        let next = vec![
            Signature::new("audit.log", vec![]).unwrap(),
            Signature::new("email.send", vec![]).unwrap(),
        ];
        assert_eq!(enqueue(&tx, next), 2);
    }
}
