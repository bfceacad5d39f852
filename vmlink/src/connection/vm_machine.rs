//! The VM lifecycle state machine.
//!
//! One step evaluates the current state's exit conditions against the cached
//! inputs and request flags; a transition marks the machine for another step,
//! so an exec runs until the machine settles. Entry actions run on the first
//! step inside a state, exit actions on the step that leaves it.
//!
//! Tie-break rule: "the VM stopped outside our control" is checked first in
//! every state, so the machine can never get stuck believing a dead VM is
//! alive.

use crate::interaction::{Question, Warning};

use super::core::{Answer, ConnectionCore};
use super::status::{SshState, VmState};
use super::ConnectOptions;

impl ConnectionCore {
    pub(super) fn vm_stm_exec(&mut self) {
        let mut changed = false;
        while self.vm_stm_step() {
            changed = true;
        }
        if changed {
            self.update_status();
        }
    }

    fn vm_transition(&mut self, to: VmState, trigger: &'static str) {
        tracing::debug!(
            vm = %self.identity.name,
            from = ?self.vm_state,
            to = ?to,
            trigger,
            "vm state transition"
        );
        self.vm_state = to;
        self.vm_state_entered = tokio::time::Instant::now();
        self.vm_stm_transition = true;
    }

    fn vm_entering(&mut self) -> bool {
        std::mem::take(&mut self.vm_stm_transition)
    }

    fn vm_exiting(&self) -> bool {
        self.vm_stm_transition
    }

    fn vm_stm_step(&mut self) -> bool {
        let entering = self.vm_entering();

        match self.vm_state {
            VmState::Off => {
                if entering {
                    self.disconnect_requested = false;
                    self.vm_started_outside = false;
                    self.ssh_had_session = false;
                }

                if self.cached_vm_running {
                    self.vm_started_outside = true;
                    self.vm_transition(VmState::Running, "started outside");
                } else if self.lock_down_requested {
                    // Stay off; lock-down holds the VM down.
                } else if self.connect_requested {
                    if self.connect_options.ask_start_vm && self.ui.should_ask(Question::StartVm) {
                        self.vm_transition(VmState::AskBeforeStarting, "connect requested, ask first");
                    } else {
                        self.vm_transition(VmState::Starting, "connect requested");
                    }
                }
            }

            VmState::AskBeforeStarting => {
                if self.cached_vm_running {
                    self.vm_started_outside = true;
                    self.vm_transition(VmState::Running, "started outside");
                } else if self.lock_down_requested {
                    self.vm_transition(VmState::Off, "lock down requested");
                } else {
                    match self.ask(Question::StartVm) {
                        Answer::Yes => self.vm_transition(VmState::Starting, "start allowed"),
                        Answer::No => {
                            self.connect_requested = false;
                            self.connect_options = ConnectOptions::default();
                            self.vm_transition(VmState::Off, "start denied");
                        }
                        Answer::Pending => {}
                    }
                }

                if self.vm_exiting() {
                    self.ui.dismiss_question(Question::StartVm);
                }
            }

            VmState::Starting => {
                if entering {
                    self.want_fast_poll(true);
                    self.vm_start_timer.start(self.timeouts.vm_start);
                    self.spawn_vm_start();
                }

                if self.cached_vm_running {
                    self.vm_transition(VmState::Running, "successfully started");
                } else if !self.cached_vm_registered {
                    self.ui.warn(Warning::VmNotRegistered);
                    self.vm_transition(VmState::StartingError, "vm not registered");
                } else if !self.vm_start_timer.is_armed() {
                    self.vm_transition(VmState::StartingError, "timeout waiting to start");
                }

                if self.vm_exiting() {
                    self.want_fast_poll(false);
                    self.vm_start_timer.stop();
                }
            }

            VmState::StartingError => {
                if entering {
                    self.connect_requested = false;
                    self.connect_options = ConnectOptions::default();
                }

                if self.cached_vm_running {
                    // Spontaneously or with user intervention.
                    self.vm_transition(VmState::Running, "recovered");
                } else if self.lock_down_requested {
                    self.vm_transition(VmState::Off, "lock down requested");
                } else if self.disconnect_requested {
                    self.vm_transition(VmState::Off, "disconnect requested");
                }
            }

            VmState::Running => {
                if entering {
                    self.schedule_ssh_pass();
                }

                let ssh_idle = matches!(
                    self.ssh_state,
                    SshState::NotConnected | SshState::Disconnected
                );

                if !self.cached_vm_running {
                    self.vm_transition(VmState::Off, "closed outside");
                } else if self.lock_down_requested {
                    // The SSH channel disconnects first.
                    if ssh_idle {
                        self.vm_transition(VmState::SoftClosing, "lock down requested");
                    }
                } else if self.disconnect_requested {
                    if ssh_idle {
                        if !self.vm_started_outside && !self.connect_later_requested {
                            self.vm_transition(VmState::SoftClosing, "disconnect requested");
                        } else if self.connect_later_requested {
                            match self.ask(Question::ResetVm) {
                                Answer::Yes => self
                                    .vm_transition(VmState::SoftClosing, "vm reset allowed"),
                                Answer::No => {
                                    self.vm_transition(VmState::Zombie, "vm reset denied")
                                }
                                Answer::Pending => {}
                            }
                        } else {
                            match self.ask(Question::CloseVm) {
                                Answer::Yes => {
                                    self.vm_transition(VmState::SoftClosing, "close allowed")
                                }
                                Answer::No => self.vm_transition(VmState::Zombie, "close denied"),
                                Answer::Pending => {}
                            }
                        }
                    }
                } else if self.vm_started_outside && !self.auto_connect_enabled && ssh_idle {
                    self.vm_transition(VmState::Zombie, "started outside, auto connect disabled");
                }

                if self.vm_exiting() {
                    self.ui.dismiss_question(Question::ResetVm);
                    self.ui.dismiss_question(Question::CloseVm);
                    self.schedule_ssh_pass();
                }
            }

            VmState::Zombie => {
                if entering {
                    self.disconnect_requested = false;
                    debug_assert!(!self.lock_down_requested || self.lock_down_failed);
                }

                if !self.cached_vm_running {
                    self.vm_transition(VmState::Off, "closed outside");
                } else if self.lock_down_requested {
                    // A prior failure keeps the machine here rather than
                    // retrying the same doomed close forever.
                    if !self.lock_down_failed {
                        self.vm_transition(VmState::SoftClosing, "lock down requested");
                    }
                } else if self.connect_requested {
                    self.vm_transition(VmState::Running, "connect requested");
                }

                if self.vm_exiting() {
                    self.ui.dismiss_warning(Warning::UnableToCloseVm);
                }
            }

            VmState::SoftClosing => {
                if entering {
                    self.want_fast_poll(true);
                    self.vm_soft_close_timer.start(self.timeouts.vm_soft_close);

                    if self.ssh_had_session && self.ssh_state != SshState::ConnectingError {
                        self.start_remote_shutdown();
                    } else {
                        self.shutdown = None;
                    }
                }

                let shutdown_failed = self
                    .shutdown
                    .as_ref()
                    .is_some_and(|shutdown| shutdown.is_error());

                if !self.cached_vm_running {
                    self.vm_transition(VmState::Off, "successfully closed");
                } else if self.shutdown.is_none() {
                    self.vm_transition(VmState::HardClosing, "no previous successful connection");
                } else if shutdown_failed {
                    self.log_shutdown_failure();
                    self.vm_transition(VmState::HardClosing, "failed to soft-close");
                } else if !self.vm_soft_close_timer.is_armed() {
                    tracing::warn!(
                        vm = %self.identity.name,
                        "timeout waiting for the virtual machine to soft-close"
                    );
                    self.vm_transition(VmState::HardClosing, "timeout waiting to soft-close");
                }

                if self.vm_exiting() {
                    self.want_fast_poll(false);
                    self.vm_soft_close_timer.stop();
                    self.shutdown = None;
                }
            }

            VmState::HardClosing => {
                if entering {
                    self.want_fast_poll(true);
                    self.vm_hard_close_timer.start(self.timeouts.vm_hard_close);
                    self.spawn_vm_power_off();
                }

                if !self.cached_vm_running {
                    self.vm_transition(VmState::Off, "successfully closed");
                } else if !self.vm_hard_close_timer.is_armed() {
                    tracing::warn!(
                        vm = %self.identity.name,
                        "timeout waiting for the virtual machine to hard-close"
                    );
                    if self.lock_down_requested {
                        match self.ask(Question::CancelLockingDown) {
                            Answer::Yes => {
                                self.lock_down_failed = true;
                                self.lock_down_aborted = true;
                                self.lock_down_failures += 1;
                                self.vm_transition(VmState::Zombie, "lock down abandoned");
                            }
                            Answer::No => {
                                // Re-enter to retry the forced power-off.
                                self.vm_transition(VmState::HardClosing, "lock down retry");
                            }
                            Answer::Pending => {}
                        }
                    } else {
                        // Keep the warning up until the VM leaves Zombie.
                        self.ui.warn(Warning::UnableToCloseVm);
                        self.vm_transition(VmState::Zombie, "timeout waiting to hard-close");
                    }
                }

                if self.vm_exiting() {
                    self.want_fast_poll(false);
                    self.vm_hard_close_timer.stop();
                    self.ui.dismiss_question(Question::CancelLockingDown);
                }
            }
        }

        self.vm_stm_transition
    }

    fn log_shutdown_failure(&self) {
        let Some(shutdown) = self.shutdown.as_ref() else {
            return;
        };
        if shutdown.is_connection_error() {
            tracing::warn!(
                vm = %self.identity.name,
                error = shutdown.connection_error_string().unwrap_or("unknown"),
                "could not connect to the virtual machine to soft-close it"
            );
        } else {
            tracing::warn!(
                vm = %self.identity.name,
                stdout = shutdown.stdout(),
                stderr = shutdown.stderr(),
                "remote shutdown command failed"
            );
        }
    }
}
