//! Renderer hosted in a child process, driven over newline-delimited JSON.
//!
//! Loading starts the host command in the renderer root, so every load re-executes the
//! renderer's code from disk. The host answers one JSON line per request:
//!
//! ```text
//! -> {"op":"construct","signature":{"kind":"no_args"}}
//! <- {"ok":true,"value":"none"}
//! -> {"op":"describe"}
//! <- {"ok":true,"value":{"methods":["button_up"],"attributes":["image"]}}
//! -> {"op":"call","name":"button_up","args":[]}
//! -> {"op":"get","name":"image"}
//! -> {"op":"shutdown"}
//! ```

use super::{
    ConstructorArgs, FaultResult, ModuleLoader, RendererFault, RendererModule, RendererObject,
    Value,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Description {
    #[serde(default)]
    methods: Vec<String>,
    #[serde(default)]
    attributes: Vec<String>,
}

/// Pipes to one running host process.
struct HostConnection {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl HostConnection {
    fn request(&mut self, request: &serde_json::Value) -> FaultResult<serde_json::Value> {
        let line = request.to_string();
        writeln!(self.stdin, "{line}")
            .and_then(|_| self.stdin.flush())
            .map_err(|e| RendererFault::protocol(format!("renderer host write failed: {e}")))?;

        let mut reply = String::new();
        let read = self
            .stdout
            .read_line(&mut reply)
            .map_err(|e| RendererFault::protocol(format!("renderer host read failed: {e}")))?;
        if read == 0 {
            return Err(RendererFault::protocol("renderer host exited"));
        }

        let response: Response = serde_json::from_str(reply.trim()).map_err(|e| {
            RendererFault::protocol(format!("renderer host sent malformed reply: {e}"))
        })?;
        if response.ok {
            Ok(response.value)
        } else {
            Err(RendererFault::new(
                response
                    .error
                    .unwrap_or_else(|| "renderer host reported an error".to_string()),
            ))
        }
    }
}

impl Drop for HostConnection {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "{}", json!({ "op": "shutdown" }));
        let _ = self.stdin.flush();
        if let Err(err) = self.child.kill() {
            log::debug!("renderer host already gone: {err}");
        }
        let _ = self.child.wait();
    }
}

type SharedHost = Arc<Mutex<HostConnection>>;

fn signature_json(args: &ConstructorArgs) -> serde_json::Value {
    match args {
        ConstructorArgs::NoArgs => json!({ "kind": "no_args" }),
        ConstructorArgs::ConfigPath(path) => json!({
            "kind": "config_path",
            "config_path": path,
        }),
        ConstructorArgs::Dependencies(deps) => json!({
            "kind": "dependencies",
            "config_path": deps.config_path,
            "font_dir": deps.font_dir,
            "display": deps.display_profile.map(|profile| profile.as_str()),
            "gpio": "stub",
        }),
    }
}

fn decode_value(raw: serde_json::Value) -> FaultResult<Value> {
    if raw.is_null() {
        return Ok(Value::None);
    }
    serde_json::from_value(raw)
        .map_err(|e| RendererFault::protocol(format!("renderer host sent unknown value: {e}")))
}

/// Starts a fresh host process per load.
pub struct ProcessLoader {
    argv: Vec<String>,
    cwd: PathBuf,
}

impl ProcessLoader {
    pub fn new(argv: Vec<String>, cwd: PathBuf) -> Self {
        Self { argv, cwd }
    }
}

impl ModuleLoader for ProcessLoader {
    fn describe(&self) -> String {
        format!("cmd:{}", self.argv.join(" "))
    }

    fn load(&self) -> FaultResult<Arc<dyn RendererModule>> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| RendererFault::new("renderer command is empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .env("PLATFORM", "SIMULATED")
            .env("SDL_VIDEODRIVER", "dummy")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| RendererFault::new(format!("failed to start {program}: {e}")))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(RendererFault::new("renderer host pipes unavailable"));
        };
        log::info!("started renderer host {} (pid {})", program, child.id());

        Ok(Arc::new(ProcessModule {
            name: program.clone(),
            host: Arc::new(Mutex::new(HostConnection {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            })),
        }))
    }
}

pub struct ProcessModule {
    name: String,
    host: SharedHost,
}

impl RendererModule for ProcessModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(&self, args: &ConstructorArgs) -> FaultResult<Box<dyn RendererObject>> {
        let mut host = self.host.lock();
        host.request(&json!({ "op": "construct", "signature": signature_json(args) }))?;
        let description: Description =
            serde_json::from_value(host.request(&json!({ "op": "describe" }))?).map_err(|e| {
                RendererFault::protocol(format!("renderer host sent bad description: {e}"))
            })?;
        drop(host);

        Ok(Box::new(ProcessObject {
            host: Arc::clone(&self.host),
            methods: description.methods.into_iter().collect(),
            attributes: description.attributes,
        }))
    }
}

/// Proxy for the renderer instance living in the host process.
pub struct ProcessObject {
    host: SharedHost,
    methods: BTreeSet<String>,
    attributes: Vec<String>,
}

impl RendererObject for ProcessObject {
    fn has_method(&self, name: &str) -> bool {
        self.methods.contains(name)
    }

    fn call(&mut self, name: &str, args: &[Value]) -> FaultResult<Value> {
        let raw = self
            .host
            .lock()
            .request(&json!({ "op": "call", "name": name, "args": args }))?;
        decode_value(raw)
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        match self.host.lock().request(&json!({ "op": "get", "name": name })) {
            Ok(raw) => decode_value(raw).ok().filter(|value| !value.is_none()),
            Err(fault) => {
                log::debug!("attribute {name} unavailable: {fault}");
                None
            }
        }
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attributes.clone()
    }
}
