//! Connector delegate
//!
//! Drives a long-running connector process over its stdin/stdout with the
//! NUL-framed protocol. Command ids map replies back to the checkable and
//! generation of the request.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::process::spawn_notification;
use super::{
    current_runtime, DelegateError, DelegateMessage, ExecutionDelegate, FrameReader, ResultSink,
    PROTOCOL_MAJOR,
};
use crate::contracts::{CheckRequest, CheckResult};
use crate::engine::NotificationJob;
use crate::model::{CheckableId, Generation};

#[derive(Debug)]
struct Pending {
    id: CheckableId,
    generation: Generation,
    started: Instant,
    /// Past this the scheduler has already synthesized a timeout result
    deadline: Instant,
}

type PendingMap = Arc<Mutex<HashMap<u64, Pending>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<u64, Pending>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drop requests past their deadline
fn sweep(pending: &mut HashMap<u64, Pending>, now: Instant) {
    let before = pending.len();
    pending.retain(|_, request| request.deadline > now);
    let expired = before - pending.len();
    if expired > 0 {
        tracing::debug!(expired, "Dropped connector requests past their timeout");
    }
}

/// Check delegate speaking the connector protocol
#[derive(Debug)]
pub struct ConnectorDelegate {
    outbound: mpsc::UnboundedSender<DelegateMessage>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    next_command_id: AtomicU64,
    _child: Option<Child>,
}

impl ConnectorDelegate {
    /// Start `sh -c command` and speak the protocol over its stdio
    pub fn spawn(command: &str, sink: ResultSink) -> Result<Self, DelegateError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DelegateError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DelegateError::unavailable("connector stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DelegateError::unavailable("connector stdout not captured"))?;

        tracing::info!(command, "Connector started");
        let mut delegate = Self::with_io(stdout, stdin, sink)?;
        delegate._child = Some(child);
        Ok(delegate)
    }

    /// Speak the protocol over arbitrary streams
    pub fn with_io<R, W>(reader: R, writer: W, sink: ResultSink) -> Result<Self, DelegateError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let runtime = current_runtime()?;
        let (outbound, queue) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        runtime.spawn(write_loop(writer, queue));
        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        runtime.spawn(async move {
            read_loop(reader, Arc::clone(&reader_pending), sink).await;
            lock(&reader_pending).clear();
            reader_closed.store(true, Ordering::Release);
        });

        outbound
            .send(DelegateMessage::VersionQuery)
            .map_err(|_| DelegateError::unavailable("connector writer stopped"))?;

        Ok(Self {
            outbound,
            pending,
            closed,
            next_command_id: AtomicU64::new(1),
            _child: None,
        })
    }

    /// Number of requests awaiting a reply within their timeout
    pub fn pending(&self) -> usize {
        let mut pending = lock(&self.pending);
        sweep(&mut pending, Instant::now());
        pending.len()
    }

    /// False once the connector stream closed or spoke an incompatible protocol
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Ask the connector to exit
    pub fn quit(&self) -> Result<(), DelegateError> {
        self.outbound
            .send(DelegateMessage::QuitQuery)
            .map_err(|_| DelegateError::unavailable("connector writer stopped"))
    }
}

impl ExecutionDelegate for ConnectorDelegate {
    fn submit(&self, request: CheckRequest) -> Result<(), DelegateError> {
        if !self.is_open() {
            return Err(DelegateError::unavailable("connector closed"));
        }
        let command_id = self.next_command_id.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        {
            let mut pending = lock(&self.pending);
            sweep(&mut pending, started);
            // A resubmitted checkable supersedes its unanswered request
            pending.retain(|_, waiting| waiting.id != request.id);
            pending.insert(
                command_id,
                Pending {
                    id: request.id.clone(),
                    generation: request.generation,
                    started,
                    deadline: started + Duration::from_secs(request.timeout_secs),
                },
            );
        }

        let query = DelegateMessage::ExecuteQuery {
            command_id,
            timeout: request.timeout_secs,
            start_time_ms: chrono::Utc::now().timestamp_millis(),
            command: request.command,
        };
        if self.outbound.send(query).is_err() {
            lock(&self.pending).remove(&command_id);
            return Err(DelegateError::unavailable("connector writer stopped"));
        }
        tracing::debug!(checkable = %request.id, command_id, "Check sent to connector");
        Ok(())
    }

    fn deliver(&self, job: NotificationJob) -> Result<(), DelegateError> {
        spawn_notification(job)
    }
}

async fn write_loop<W>(mut writer: W, mut queue: mpsc::UnboundedReceiver<DelegateMessage>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        let frame = message.encode();
        if let Err(err) = writer.write_all(&frame).await {
            tracing::error!(error = %err, "Connector write failed");
            break;
        }
        if let Err(err) = writer.flush().await {
            tracing::error!(error = %err, "Connector flush failed");
            break;
        }
    }
}

async fn read_loop<R>(mut reader: R, pending: PendingMap, sink: ResultSink)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameReader::new();
    let mut chunk = vec![0u8; 8192];

    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                tracing::error!(error = %err, "Connector read failed");
                break;
            }
        };
        if let Err(err) = frames.push(&chunk[..read]) {
            tracing::warn!(error = %err, "Dropping oversized connector frame");
            continue;
        }

        while let Some(frame) = frames.next_frame() {
            let message = match DelegateMessage::decode(&frame) {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(error = %err, "Malformed connector frame");
                    continue;
                }
            };

            match message {
                DelegateMessage::ExecuteResponse {
                    command_id,
                    is_executed,
                    exit_code,
                    stderr,
                    stdout,
                } => {
                    let Some(request) = lock(&pending).remove(&command_id) else {
                        tracing::debug!(command_id, "Reply for unknown command id");
                        continue;
                    };
                    let (code, output) = if is_executed {
                        (exit_code, stdout)
                    } else {
                        (3, stderr)
                    };
                    let result = CheckResult::active(
                        request.id,
                        request.generation,
                        code,
                        output,
                        request.started.elapsed().as_millis() as u64,
                    );
                    if sink.send(result).await.is_err() {
                        return;
                    }
                }
                DelegateMessage::VersionResponse { major, minor } => {
                    if major != PROTOCOL_MAJOR {
                        tracing::error!(
                            major,
                            minor,
                            expected = PROTOCOL_MAJOR,
                            "Incompatible connector protocol version"
                        );
                        return;
                    }
                    tracing::info!(major, minor, "Connector version");
                }
                DelegateMessage::Error { code, message } => {
                    tracing::warn!(code, message = %message, "Connector reported an error");
                }
                DelegateMessage::QuitResponse => {
                    tracing::info!("Connector quit");
                    return;
                }
                other => {
                    tracing::debug!(type_id = other.type_id(), "Unexpected connector message");
                }
            }
        }
    }
    tracing::info!(pending = lock(&pending).len(), "Connector stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineMessage;
    use tokio::io::duplex;

    fn request(host: &str, timeout_secs: u64) -> CheckRequest {
        CheckRequest {
            id: CheckableId::host(host),
            generation: Generation(1),
            command: "check_ping".to_string(),
            timeout_secs,
            scheduled_at: 0,
        }
    }

    #[tokio::test]
    async fn test_execute_roundtrip_over_duplex() {
        let (engine_side, connector_side) = duplex(4096);
        let (engine_read, engine_write) = tokio::io::split(engine_side);
        let (mut connector_read, mut connector_write) = tokio::io::split(connector_side);

        let (sender, mut inbox) = mpsc::channel(4);
        let delegate =
            ConnectorDelegate::with_io(engine_read, engine_write, ResultSink::new(sender)).unwrap();
        delegate
            .submit(CheckRequest {
                id: CheckableId::service("web01", "http"),
                generation: Generation(3),
                command: "check_http".to_string(),
                timeout_secs: 10,
                scheduled_at: 0,
            })
            .unwrap();
        assert_eq!(delegate.pending(), 1);

        let mut frames = FrameReader::new();
        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        while received.len() < 2 {
            let read = connector_read.read(&mut chunk).await.unwrap();
            frames.push(&chunk[..read]).unwrap();
            while let Some(frame) = frames.next_frame() {
                received.push(DelegateMessage::decode(&frame).unwrap());
            }
        }
        assert_eq!(received[0], DelegateMessage::VersionQuery);
        let DelegateMessage::ExecuteQuery { command_id, command, .. } = &received[1] else {
            panic!("expected execute query, got {:?}", received[1]);
        };
        assert_eq!(command, "check_http");

        let reply = DelegateMessage::ExecuteResponse {
            command_id: *command_id,
            is_executed: true,
            exit_code: 1,
            stderr: String::new(),
            stdout: "HTTP WARNING".to_string(),
        };
        connector_write.write_all(&reply.encode()).await.unwrap();

        match inbox.recv().await.unwrap() {
            EngineMessage::Result(result) => {
                assert_eq!(result.id, CheckableId::service("web01", "http"));
                assert_eq!(result.generation, Some(Generation(3)));
                assert_eq!(result.return_code, 1);
                assert_eq!(result.output, "HTTP WARNING");
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(delegate.pending(), 0);
    }

    #[tokio::test]
    async fn test_unanswered_requests_expire() {
        let (engine_side, _connector_side) = duplex(1 << 16);
        let (engine_read, engine_write) = tokio::io::split(engine_side);
        let (sender, _inbox) = mpsc::channel(4);
        let delegate =
            ConnectorDelegate::with_io(engine_read, engine_write, ResultSink::new(sender)).unwrap();

        for index in 0..100 {
            delegate.submit(request(&format!("node{:02}", index), 0)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(delegate.pending(), 0);

        delegate.submit(request("web01", 60)).unwrap();
        delegate.submit(request("web01", 60)).unwrap();
        delegate.submit(request("web02", 60)).unwrap();
        assert_eq!(delegate.pending(), 2);
    }

    #[tokio::test]
    async fn test_incompatible_version_closes_connector() {
        let (engine_side, connector_side) = duplex(4096);
        let (engine_read, engine_write) = tokio::io::split(engine_side);
        let (_connector_read, mut connector_write) = tokio::io::split(connector_side);
        let (sender, _inbox) = mpsc::channel(4);
        let delegate =
            ConnectorDelegate::with_io(engine_read, engine_write, ResultSink::new(sender)).unwrap();
        delegate.submit(request("web01", 60)).unwrap();

        let reply = DelegateMessage::VersionResponse { major: PROTOCOL_MAJOR + 1, minor: 0 };
        connector_write.write_all(&reply.encode()).await.unwrap();

        for _ in 0..200 {
            if !delegate.is_open() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!delegate.is_open());
        assert_eq!(delegate.pending(), 0);
        assert!(matches!(
            delegate.submit(request("web01", 60)),
            Err(DelegateError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_execution_reports_unknown() {
        let (engine_side, connector_side) = duplex(4096);
        let (engine_read, engine_write) = tokio::io::split(engine_side);
        let (mut connector_read, mut connector_write) = tokio::io::split(connector_side);
        let (sender, mut inbox) = mpsc::channel(4);
        let delegate =
            ConnectorDelegate::with_io(engine_read, engine_write, ResultSink::new(sender)).unwrap();
        delegate.submit(request("web01", 60)).unwrap();

        let mut frames = FrameReader::new();
        let mut command_id = None;
        let mut chunk = [0u8; 256];
        while command_id.is_none() {
            let read = connector_read.read(&mut chunk).await.unwrap();
            frames.push(&chunk[..read]).unwrap();
            while let Some(frame) = frames.next_frame() {
                if let DelegateMessage::ExecuteQuery { command_id: id, .. } =
                    DelegateMessage::decode(&frame).unwrap()
                {
                    command_id = Some(id);
                }
            }
        }

        let reply = DelegateMessage::ExecuteResponse {
            command_id: command_id.unwrap(),
            is_executed: false,
            exit_code: 0,
            stderr: "execvp: No such file".to_string(),
            stdout: String::new(),
        };
        connector_write.write_all(&reply.encode()).await.unwrap();

        match inbox.recv().await.unwrap() {
            EngineMessage::Result(result) => {
                assert_eq!(result.id, CheckableId::host("web01"));
                assert_eq!(result.return_code, 3);
                assert_eq!(result.output, "execvp: No such file");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
