use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;
use tuner_proto::config::AudioConfig;

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' did not finish within {after:?}")]
    Timeout { program: String, after: Duration },
    #[error("'{program}' exited with {status}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
    },
}

/// System output volume.  `Disabled` accepts every call, which keeps hosts
/// without ALSA (and the tests) working.
#[derive(Debug, Clone)]
pub enum Mixer {
    Disabled,
    Amixer {
        program: String,
        control: String,
        timeout: Duration,
    },
}

impl Mixer {
    pub fn from_config(config: &AudioConfig) -> Self {
        if config.mixer_enabled {
            Mixer::Amixer {
                program: config.mixer_program.clone(),
                control: config.mixer_control.clone(),
                timeout: config.mixer_timeout(),
            }
        } else {
            Mixer::Disabled
        }
    }

    pub async fn set_volume(&self, volume: u8) -> Result<(), MixerError> {
        let Mixer::Amixer {
            program,
            control,
            timeout,
        } = self
        else {
            return Ok(());
        };

        debug!("mixer: {} sset {} {}%", program, control, volume);
        // kill_on_drop reaps a mixer that outlives the timeout.
        let mut child = Command::new(program)
            .arg("sset")
            .arg(control)
            .arg(format!("{}%", volume))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MixerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let status = match tokio::time::timeout(*timeout, child.wait()).await {
            Ok(status) => status.map_err(|source| MixerError::Spawn {
                program: program.clone(),
                source,
            })?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(MixerError::Timeout {
                    program: program.clone(),
                    after: *timeout,
                });
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(MixerError::Exit {
                program: program.clone(),
                status,
            })
        }
    }
}
