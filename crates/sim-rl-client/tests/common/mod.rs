//! In-process simulator double for integration tests
#![allow(dead_code)]

use serde_json::{Value, json};
use sim_bridge::framing::{MAX_FRAME_LEN, read_frame, write_frame};
use sim_bridge::{SimAddress, SimRequest, SimResponse};
use sim_rl_core::state::TRACKED_SPELLS;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How the mock answers one request
pub enum Reply {
    Respond(SimResponse),
    /// Read the request but never answer it
    Ignore,
    /// Drop the connection without answering
    Hangup,
}

pub fn ok(body: Value) -> Reply {
    Reply::Respond(SimResponse::ok(body))
}

pub fn failure(body: Value) -> Reply {
    Reply::Respond(SimResponse::failure(body))
}

type Handler = Box<dyn FnMut(&SimRequest) -> Reply + Send>;

/// Requests and connections seen by a mock
#[derive(Clone, Default)]
pub struct Journal {
    requests: Arc<Mutex<Vec<SimRequest>>>,
    connections: Arc<AtomicUsize>,
}

impl Journal {
    pub fn requests(&self) -> Vec<SimRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<&'static str> {
        self.requests().iter().map(SimRequest::command).collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Simulator double serving one connection at a time
pub struct MockSim {
    pub address: SimAddress,
    pub journal: Journal,
    task: JoinHandle<()>,
    socket_path: Option<PathBuf>,
}

impl MockSim {
    /// Listen on an ephemeral loopback TCP port
    pub async fn tcp<F>(handler: F) -> Self
    where
        F: FnMut(&SimRequest) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = SimAddress::Tcp(listener.local_addr().unwrap().to_string());
        let journal = Journal::default();

        let task_journal = journal.clone();
        let mut handler: Handler = Box::new(handler);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                task_journal.connections.fetch_add(1, Ordering::SeqCst);
                serve(stream, &mut handler, &task_journal).await;
            }
        });

        Self {
            address,
            journal,
            task,
            socket_path: None,
        }
    }

    /// Listen on a fresh Unix socket in the temp directory
    #[cfg(unix)]
    pub async fn unix<F>(handler: F) -> Self
    where
        F: FnMut(&SimRequest) -> Reply + Send + 'static,
    {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "sim-mock-{}-{}.sock",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let journal = Journal::default();

        let task_journal = journal.clone();
        let mut handler: Handler = Box::new(handler);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                task_journal.connections.fetch_add(1, Ordering::SeqCst);
                serve(stream, &mut handler, &task_journal).await;
            }
        });

        Self {
            address: SimAddress::Unix(path.clone()),
            journal,
            task,
            socket_path: Some(path),
        }
    }
}

impl Drop for MockSim {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(path) = &self.socket_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

async fn serve<S>(mut stream: S, handler: &mut Handler, journal: &Journal)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Ok(payload) = read_frame(&mut stream, MAX_FRAME_LEN).await else {
            return;
        };
        let request: SimRequest =
            serde_json::from_slice(&payload).expect("client sent an invalid request");
        journal.requests.lock().unwrap().push(request.clone());

        match handler(&request) {
            Reply::Respond(response) => {
                let bytes = serde_json::to_vec(&response).unwrap();
                if write_frame(&mut stream, &bytes).await.is_err() {
                    return;
                }
            }
            Reply::Ignore => {}
            Reply::Hangup => return,
        }
    }
}

/// State body with every tracked spell castable
pub fn state_body(dps: f64, is_done: bool) -> Value {
    body(dps, is_done, 0, 0.0, 0)
}

fn body(dps: f64, is_done: bool, time: u64, damage: f64, gcd: u64) -> Value {
    let abilities: Vec<Value> = TRACKED_SPELLS
        .iter()
        .map(|spell| {
            json!({
                "name": spell,
                "canCast": gcd == 0,
                "cdRemaining": 0,
                "gcdCost": 1500
            })
        })
        .collect();
    json!({
        "abilities": abilities,
        "debuffs": [
            {"name": "FrostFever", "isActive": damage > 0.0, "duration": 15000},
            {"name": "BloodPlague", "isActive": false, "duration": 0}
        ],
        "buffs": [],
        "runeTypes": ["Blood", "Blood", "Frost", "Frost", "Unholy", "Unholy"],
        "runeCDs": [0, 0, 0, 0, 0, 0],
        "runeGraces": [0, 0, 0, 0, 0, 0],
        "gcdRemaining": gcd,
        "gcdAvailable": gcd == 0,
        "isExecute35": false,
        "isDone": is_done,
        "currentTime": time,
        "totalDamage": damage,
        "dps": dps,
        "runicPower": 0
    })
}

/// Small stateful simulator: each cast deals 1000 damage and triggers a
/// 1500ms global cooldown, waits advance the clock
#[derive(Debug, Default)]
pub struct FakeSim {
    started: bool,
    duration: u64,
    time: u64,
    damage: f64,
    gcd: u64,
}

impl FakeSim {
    pub fn handle(&mut self, request: &SimRequest) -> Reply {
        match request {
            SimRequest::StartSimSession(config) => {
                *self = FakeSim {
                    started: true,
                    duration: config.duration,
                    ..Default::default()
                };
                ok(Value::Null)
            }
            _ if !self.started => failure(json!("No active simulation")),
            SimRequest::GetState => ok(self.state()),
            SimRequest::Cast { spell } => {
                if self.gcd > 0 || !TRACKED_SPELLS.contains(&spell.as_str()) {
                    return failure(json!(format!("{} not ready", spell)));
                }
                self.damage += 1000.0;
                self.gcd = 1500;
                ok(json!("Cast"))
            }
            SimRequest::WaitDuration { duration } => {
                self.time += duration;
                self.gcd = self.gcd.saturating_sub(*duration);
                ok(self.state())
            }
        }
    }

    fn state(&self) -> Value {
        let dps = if self.time == 0 {
            0.0
        } else {
            self.damage * 1000.0 / self.time as f64
        };
        body(
            dps,
            self.time >= self.duration,
            self.time,
            self.damage,
            self.gcd,
        )
    }
}

/// Handler driving a fresh [`FakeSim`]
pub fn fake_sim() -> impl FnMut(&SimRequest) -> Reply + Send + 'static {
    let mut sim = FakeSim::default();
    move |request| sim.handle(request)
}
