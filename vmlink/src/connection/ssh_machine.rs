//! The SSH channel state machine.
//!
//! Gated by the VM machine: the channel may only leave `NotConnected` while
//! the VM is `Running`, and any VM state has precedence over transport
//! reports - a stale "connected" flag never outweighs a dead VM.

use crate::interaction::Question;

use super::core::{Answer, ConnectionCore};
use super::status::{SshState, VmState};
use super::ConnectOptions;

impl ConnectionCore {
    pub(super) fn ssh_stm_exec(&mut self) {
        let mut changed = false;
        while self.ssh_stm_step() {
            changed = true;
        }
        if changed {
            self.update_status();
        }
    }

    fn ssh_transition(&mut self, to: SshState, trigger: &'static str) {
        tracing::debug!(
            vm = %self.identity.name,
            from = ?self.ssh_state,
            to = ?to,
            trigger,
            "ssh state transition"
        );
        self.ssh_state = to;
        self.ssh_stm_transition = true;
    }

    fn ssh_entering(&mut self) -> bool {
        std::mem::take(&mut self.ssh_stm_transition)
    }

    fn ssh_exiting(&self) -> bool {
        self.ssh_stm_transition
    }

    fn ssh_stm_step(&mut self) -> bool {
        let entering = self.ssh_entering();

        match self.ssh_state {
            SshState::NotConnected => {
                if entering {
                    self.transport = None;
                    self.schedule_vm_pass();
                }

                if self.lock_down_requested {
                    self.connect_requested = false;
                    self.connect_options = ConnectOptions::default();
                } else if self.vm_state == VmState::Running {
                    if self.connect_requested {
                        self.ssh_transition(SshState::Connecting, "vm running, connect requested");
                    } else if self.auto_connect_enabled {
                        self.ssh_transition(SshState::Connecting, "vm running, auto connect");
                    }
                }
            }

            SshState::Connecting => {
                if entering {
                    self.cached_ssh_connected = false;
                    self.cached_ssh_error = None;
                    self.cached_ssh_error_origin = None;
                    self.create_transport_and_connect();
                    self.ssh_retry_timer.start(self.timeouts.ssh_retry_normal);
                }

                if self.vm_state != VmState::Running {
                    // Intentionally outweighs a cached "connected" flag.
                    self.ssh_transition(SshState::NotConnected, "vm not running");
                } else if !self.connect_requested && !self.auto_connect_enabled {
                    self.ssh_transition(SshState::NotConnected, "auto connect disabled");
                } else if self.cached_ssh_connected {
                    self.ssh_transition(SshState::Connected, "successfully connected");
                } else if let Some(error) = self.cached_ssh_error.clone() {
                    let recoverable = error.kind.is_recoverable();
                    if self.vm_started_outside && !self.connect_requested {
                        self.ssh_transition(
                            SshState::ConnectingError,
                            "connecting error, connect not requested",
                        );
                    } else if recoverable && self.within_boot_grace() {
                        // Possibly just a slow guest boot; the retry timer
                        // keeps re-attempting silently.
                    } else if !recoverable && !self.within_boot_grace() {
                        self.ssh_transition(SshState::ConnectingError, "unrecoverable error");
                    } else {
                        match self.ask(Question::CancelConnecting) {
                            Answer::Yes => self
                                .ssh_transition(SshState::ConnectingError, "retry denied"),
                            Answer::No => {
                                // Re-enter with a fresh transport.
                                self.ssh_transition(SshState::Connecting, "retry allowed");
                            }
                            Answer::Pending => {}
                        }
                    }
                }

                if self.ssh_exiting() {
                    self.ssh_retry_timer.stop();
                    self.ui.dismiss_question(Question::CancelConnecting);
                }
            }

            SshState::ConnectingError => {
                if entering {
                    self.connect_requested = false;
                    self.connect_options = ConnectOptions::default();
                    self.ssh_retry_timer.start(self.timeouts.ssh_retry_slow);
                }

                if self.vm_state != VmState::Running {
                    self.ssh_transition(SshState::NotConnected, "vm not running");
                } else if self.cached_ssh_connected {
                    self.ssh_transition(SshState::Connected, "recovered");
                } else if self.lock_down_requested {
                    self.ssh_transition(SshState::NotConnected, "lock down requested");
                } else if self.disconnect_requested {
                    self.ssh_transition(SshState::Disconnected, "disconnect requested");
                }

                if self.ssh_exiting() {
                    self.ssh_retry_timer.stop();
                }
            }

            SshState::Connected => {
                if entering {
                    self.connect_requested = false;
                    self.connect_options = ConnectOptions::default();
                    self.ssh_had_session = true;
                }

                if self.vm_state != VmState::Running {
                    self.ssh_transition(SshState::NotConnected, "vm not running");
                } else if !self.cached_ssh_connected {
                    self.ssh_transition(SshState::ConnectionLost, "connection lost");
                } else if self.lock_down_requested {
                    self.ssh_transition(SshState::Disconnecting, "lock down requested");
                } else if self.disconnect_requested {
                    self.ssh_transition(SshState::Disconnecting, "disconnect requested");
                }
            }

            SshState::Disconnecting => {
                if entering {
                    if let Some(transport) = self.transport.as_mut() {
                        transport.disconnect_from_host();
                    }
                }

                if self.vm_state != VmState::Running {
                    self.ssh_transition(SshState::NotConnected, "vm not running");
                } else if !self.cached_ssh_connected {
                    self.ssh_transition(SshState::Disconnected, "successfully disconnected");
                }
            }

            SshState::Disconnected => {
                if entering {
                    self.transport = None;
                    // A pending soft close may have been waiting on this.
                    self.schedule_vm_pass();
                }

                if self.vm_state != VmState::Running {
                    self.ssh_transition(SshState::NotConnected, "vm not running");
                } else if self.connect_requested {
                    self.ssh_transition(SshState::Connecting, "connect requested");
                }
            }

            SshState::ConnectionLost => {
                if entering {
                    self.want_fast_poll(true);
                    self.ssh_retry_timer.start(self.timeouts.ssh_retry_normal);
                }

                if self.vm_state != VmState::Running {
                    self.ssh_transition(SshState::NotConnected, "vm not running");
                } else if self.cached_ssh_connected {
                    self.ssh_transition(SshState::Connected, "recovered");
                } else if self.lock_down_requested {
                    self.ssh_transition(SshState::Disconnected, "lock down requested");
                } else if self.disconnect_requested {
                    self.ssh_transition(SshState::Disconnected, "disconnect requested");
                }

                if self.ssh_exiting() {
                    self.want_fast_poll(false);
                    self.ssh_retry_timer.stop();
                }
            }
        }

        self.ssh_stm_transition
    }
}
