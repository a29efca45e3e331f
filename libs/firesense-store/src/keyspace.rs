//! Device key-path layout
//!
//! ```text
//! {base}/config/devices/{id}/channels       channel definitions
//! {base}/config/devices/{id}/conditions     IF/THEN/ELSE triples
//! {base}/status/{id}/channels/{channel}     published channel values
//! {base}/status/{id}/terminal               debug/terminal messages
//! {base}/status/{id}/lastSeen               last status flush (epoch s)
//! {base}/status/{id}/info                   device summary
//! {base}/controls/{id}/cmd                  remote command
//! {base}/controls/{id}/ack                  command acknowledgement
//! {base}/logs/{id}/{ts}                     periodic channel snapshots
//! ```

/// Key paths for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePaths {
    base: String,
    device_id: String,
}

impl DevicePaths {
    pub fn new(base: impl AsRef<str>, device_id: impl Into<String>) -> Self {
        Self {
            base: base.as_ref().trim_matches('/').to_string(),
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn channels(&self) -> String {
        self.join(&["config", "devices", &self.device_id, "channels"])
    }

    pub fn conditions(&self) -> String {
        self.join(&["config", "devices", &self.device_id, "conditions"])
    }

    pub fn channel_status(&self, channel_id: &str) -> String {
        self.join(&["status", &self.device_id, "channels", channel_id])
    }

    pub fn terminal(&self) -> String {
        self.join(&["status", &self.device_id, "terminal"])
    }

    pub fn last_seen(&self) -> String {
        self.join(&["status", &self.device_id, "lastSeen"])
    }

    pub fn info(&self) -> String {
        self.join(&["status", &self.device_id, "info"])
    }

    pub fn command(&self) -> String {
        self.join(&["controls", &self.device_id, "cmd"])
    }

    pub fn ack(&self) -> String {
        self.join(&["controls", &self.device_id, "ack"])
    }

    pub fn logs(&self) -> String {
        self.join(&["logs", &self.device_id])
    }

    pub fn log_entry(&self, ts: i64) -> String {
        self.join(&["logs", &self.device_id, &ts.to_string()])
    }

    fn join(&self, segments: &[&str]) -> String {
        let mut path = self.base.clone();
        for segment in segments {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(segment);
        }
        path
    }
}

/// Split a key path into non-empty segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// True when one path is an ancestor of (or equal to) the other
pub fn paths_overlap(a: &str, b: &str) -> bool {
    let a = segments(a);
    let b = segments(b);
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}
