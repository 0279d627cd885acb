use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Everything needed to find a constrained task again after a client restart.
///
/// Serialised as JSON and used verbatim as the handle id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgroup: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<String>,
}

impl Session {
    pub fn encode(&self) -> Result<String, ExecError> {
        serde_json::to_string(self).map_err(|e| ExecError::Decode(e.to_string()))
    }

    pub fn decode(id: &str) -> Result<Self, ExecError> {
        let session: Session = serde_json::from_str(id)
            .map_err(|e| ExecError::Decode(format!("{e} in {id:?}")))?;
        if session.pid == 0 {
            return Err(ExecError::Decode(format!("session {id:?} has no pid")));
        }
        Ok(session)
    }

    pub fn cgroup_path(&self) -> Option<PathBuf> {
        self.cgroup.as_ref().map(PathBuf::from)
    }

    pub fn mount_paths(&self) -> Vec<PathBuf> {
        self.mounts.iter().map(PathBuf::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_format() {
        let session = Session {
            pid: 4242,
            task_dir: Some("/var/alloc/a1/web".into()),
            cgroup: Some("/sys/fs/cgroup/tno/task-1".into()),
            mounts: vec!["/var/alloc/a1/web/bin".into()],
        };
        let id = session.encode().unwrap();
        assert_eq!(
            id,
            r#"{"pid":4242,"taskDir":"/var/alloc/a1/web","cgroup":"/sys/fs/cgroup/tno/task-1","mounts":["/var/alloc/a1/web/bin"]}"#
        );
        assert_eq!(Session::decode(&id).unwrap(), session);
    }

    #[test]
    fn minimal_token_decodes() {
        let session = Session::decode(r#"{"pid":7}"#).unwrap();
        assert_eq!(session.pid, 7);
        assert!(session.cgroup_path().is_none());
        assert!(session.mount_paths().is_empty());
    }

    #[test]
    fn malformed_tokens_are_decode_errors() {
        for id in ["", "PID:12", "{", r#"{"pid":"x"}"#, r#"{"pid":0}"#, r#"{"pid":-3}"#] {
            assert!(matches!(Session::decode(id), Err(ExecError::Decode(_))), "{id}");
        }
    }
}
