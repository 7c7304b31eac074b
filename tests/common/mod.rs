/*!
 * Shared test support: a scripted stand-in for the external tools
 */

use std::sync::Mutex;

use transfat::tool::{ToolError, ToolInvocation, ToolOutput, ToolRunner};

/// Scripted tool runner. The encoder writes recognizable MP3 stand-in
/// bytes to its target path; the reorder utility and umount succeed or
/// fail as configured. Every invocation line is recorded.
pub struct FakeTools {
    pub invocations: Mutex<Vec<String>>,
    /// Encoder invocations whose command line contains this fail
    pub fail_encode_containing: Option<String>,
    /// Exit status for the reorder utility
    pub reorder_status: i32,
    /// Exit status for umount
    pub umount_status: i32,
}

impl Default for FakeTools {
    fn default() -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            fail_encode_containing: None,
            reorder_status: 0,
            umount_status: 0,
        }
    }
}

impl FakeTools {
    pub fn recorded(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invoked_matching(&self, needle: &str) -> bool {
        self.recorded().iter().any(|line| line.contains(needle))
    }

    fn ok() -> ToolOutput {
        ToolOutput {
            status: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn failed(status: i32, stderr: &str) -> ToolOutput {
        ToolOutput {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

impl ToolRunner for FakeTools {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let line = invocation.describe();
        self.invocations.lock().unwrap().push(line.clone());

        match invocation.program() {
            "ffmpeg" => {
                if let Some(ref fail) = self.fail_encode_containing {
                    if line.contains(fail.as_str()) {
                        return Ok(Self::failed(1, "Invalid data found when processing input"));
                    }
                }
                let target = invocation
                    .args()
                    .last()
                    .expect("encoder invocation always names a target");
                std::fs::write(target, b"ID3 converted-mp3-bytes").unwrap();
                Ok(Self::ok())
            }
            "fatsort" => {
                if self.reorder_status == 0 {
                    Ok(Self::ok())
                } else {
                    Ok(Self::failed(self.reorder_status, "unable to open device"))
                }
            }
            "umount" => {
                if self.umount_status == 0 {
                    Ok(Self::ok())
                } else {
                    Ok(Self::failed(self.umount_status, "target is busy"))
                }
            }
            "sync" => Ok(Self::ok()),
            other => panic!("unexpected tool invocation: {}", other),
        }
    }
}
