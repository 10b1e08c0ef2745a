//! Virtual machine operations.
//!
//! A machine lives in two layers: a definition (database record under
//! `vm/{id}/define/`) and the deployed guest itself (`vm/{id}/`). The
//! multi-step sequences, [`CloudApi::create_machine`] and
//! [`CloudApi::delete_machine`], compose the single-endpoint operations
//! and drive the returned server tasks to completion.

use crate::client::CloudApi;
use crate::models::{
    CommonParams, CreateMachineOpts, DiskDefinition, MachineDefinition, NicDefinition, VmDetails,
    VmFilter,
};
use crate::tasks::{self, TaskResponse, TaskWait, DEFAULT_POLL_INTERVAL};
use crate::Result;
use danube_core::envelope::Envelope;
use danube_core::error::{Error, ResultExt};
use danube_core::request::{ApiRequest, Filter};
use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Status query budget for a machine deploy.
const DEPLOY_ATTEMPTS: u32 = 150;

/// Status query budget for stop/destroy/apply operations.
const TEARDOWN_ATTEMPTS: u32 = 50;

/// States that resolve on their own if given time.
fn is_transient_state(state: &str) -> bool {
    matches!(state, "deploying" | "notready" | "starting" | "stopping") || state.ends_with('-')
}

fn extended_filter() -> Filter {
    let mut filter = Filter::new();
    filter.set("extended", "true");
    filter
}

impl CloudApi {
    /// List the names of all machines on record.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_machines(&self) -> Result<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .core()
            .execute(ApiRequest::get("vm"))
            .await
            .op_context(|| "failed to get list of machines")?;
        Ok(envelope.into_result())
    }

    /// List extended machine details matching `filter`.
    ///
    /// The server returns the full extended listing; filtering happens
    /// client-side per [`VmFilter::matches`].
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_machines_filtered_full(&self, filter: &VmFilter) -> Result<Vec<VmDetails>> {
        let envelope: Envelope<Vec<VmDetails>> = self
            .core()
            .execute(ApiRequest::get("vm").with_filter(extended_filter()))
            .await
            .op_context(|| "failed to get list of machines")?;

        let matched: Vec<VmDetails> = envelope
            .into_result()
            .into_iter()
            .filter(|vm| filter.matches(vm))
            .collect();
        debug!(uuids = ?vm_uuids(&matched), "filtered machine list");
        Ok(matched)
    }

    /// List the identifiers of machines matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_machines_filtered(&self, filter: &VmFilter) -> Result<Vec<String>> {
        let machines = self.list_machines_filtered_full(filter).await?;
        Ok(vm_uuids(&machines))
    }

    /// Get the extended details of one machine.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the machine is unknown.
    pub async fn get_machine(&self, machine_id: &str) -> Result<VmDetails> {
        let envelope: Envelope<VmDetails> = self
            .core()
            .execute(ApiRequest::get(format!("vm/{machine_id}")).with_filter(extended_filter()))
            .await
            .op_context(|| format!("failed to get machine \"{machine_id}\""))?;
        Ok(envelope.into_result())
    }

    /// Get the current state of a machine.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the machine is unknown.
    pub async fn machine_state(&self, machine_id: &str) -> Result<String> {
        let envelope: Envelope<VmDetails> = self
            .core()
            .execute(ApiRequest::get(format!("vm/{machine_id}/status")))
            .await
            .op_context(|| format!("failed to get machine \"{machine_id}\""))?;
        Ok(envelope.into_result().status.unwrap_or_default())
    }

    /// List the NIC definitions of a machine.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn machine_nics(&self, machine_id: &str) -> Result<Vec<NicDefinition>> {
        let envelope: Envelope<Vec<NicDefinition>> = self
            .core()
            .execute(ApiRequest::get(format!("vm/{machine_id}/define/nic")))
            .await
            .op_context(|| format!("failed to get nic info for machine \"{machine_id}\""))?;
        Ok(envelope.into_result())
    }

    /// List the disk definitions of a machine.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn machine_disks(&self, machine_id: &str) -> Result<Vec<DiskDefinition>> {
        let envelope: Envelope<Vec<DiskDefinition>> = self
            .core()
            .execute(ApiRequest::get(format!("vm/{machine_id}/define/disk")))
            .await
            .op_context(|| format!("failed to get disk info for machine \"{machine_id}\""))?;
        Ok(envelope.into_result())
    }

    /// Create a machine definition. Nothing is deployed yet.
    ///
    /// Returns the stored definition, including the server-assigned
    /// identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn create_machine_definition(
        &self,
        definition: &MachineDefinition,
    ) -> Result<MachineDefinition> {
        let name = definition.name.clone();
        let envelope: Envelope<MachineDefinition> = self
            .core()
            .execute(
                ApiRequest::post(format!("vm/{name}/define"), definition.clone())
                    .with_accept(&[StatusCode::CREATED]),
            )
            .await
            .op_context(|| format!("failed to create machine with name: {name}"))?;
        Ok(envelope.into_result())
    }

    /// Attach a disk definition to the first unused slot.
    ///
    /// # Errors
    ///
    /// Returns an error when the slot lookup or the attach request fails.
    pub async fn add_disk_definition(
        &self,
        machine_id: &str,
        definition: &DiskDefinition,
    ) -> Result<DiskDefinition> {
        let context = || format!("failed to create disk definition for machine: {machine_id}");
        let slot = self.machine_disks(machine_id).await.op_context(context)?.len() + 1;

        let envelope: Envelope<DiskDefinition> = self
            .core()
            .execute(
                ApiRequest::post(
                    format!("vm/{machine_id}/define/disk/{slot}"),
                    definition.clone(),
                )
                .with_accept(&[StatusCode::CREATED]),
            )
            .await
            .op_context(context)?;
        Ok(envelope.into_result())
    }

    /// Attach a NIC definition to the first unused slot.
    ///
    /// # Errors
    ///
    /// Returns an error when the slot lookup or the attach request fails.
    pub async fn add_nic_definition(
        &self,
        machine_id: &str,
        definition: &NicDefinition,
    ) -> Result<NicDefinition> {
        let context = || format!("failed to create nic definition for machine: {machine_id}");
        let slot = self.machine_nics(machine_id).await.op_context(context)?.len() + 1;

        let envelope: Envelope<NicDefinition> = self
            .core()
            .execute(
                ApiRequest::post(
                    format!("vm/{machine_id}/define/nic/{slot}"),
                    definition.clone(),
                )
                .with_accept(&[StatusCode::CREATED]),
            )
            .await
            .op_context(context)?;
        Ok(envelope.into_result())
    }

    /// Deploy a defined machine onto a compute node and wait for the
    /// server task to finish.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the deploy task fails or
    /// times out.
    pub async fn deploy_machine(&self, machine_id: &str) -> Result<()> {
        let context = || format!("failed to deploy machine \"{machine_id}\"");
        let response: TaskResponse = self
            .core()
            .execute(
                ApiRequest::post(format!("vm/{machine_id}"), CommonParams::default())
                    .with_accept(&[StatusCode::CREATED, StatusCode::OK]),
            )
            .await
            .op_context(context)?;

        let task_id = response.task_id.unwrap_or_default();
        tasks::wait_for_task(self, &task_id, &TaskWait::attempts(DEPLOY_ATTEMPTS))
            .await
            .op_context(context)?;
        Ok(())
    }

    /// Push pending definition changes to a deployed machine and wait for
    /// the server task to finish.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the task fails or times
    /// out.
    pub async fn apply_changes(&self, machine_id: &str) -> Result<()> {
        let context = || format!("failed to apply machine settings \"{machine_id}\"");
        let response: TaskResponse = self
            .core()
            .execute(
                ApiRequest::put(format!("vm/{machine_id}"), CommonParams::default())
                    .with_accept(&[StatusCode::CREATED, StatusCode::OK]),
            )
            .await
            .op_context(context)?;

        let task_id = response.task_id.unwrap_or_default();
        tasks::wait_for_task(self, &task_id, &TaskWait::attempts(TEARDOWN_ATTEMPTS))
            .await
            .op_context(context)?;
        Ok(())
    }

    /// Start a stopped machine and wait for it to come up.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the start task fails or
    /// times out.
    pub async fn start_machine(&self, machine_id: &str) -> Result<()> {
        self.change_machine_status(machine_id, "start").await
    }

    /// Stop a running machine and wait for it to halt.
    ///
    /// A machine already reported as stopped is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the stop task fails or
    /// times out.
    pub async fn stop_machine(&self, machine_id: &str, force: bool) -> Result<()> {
        if let Ok(state) = self.machine_state(machine_id).await {
            if state == "stopped" {
                return Ok(());
            }
        }

        let context = || format!("failed to stop machine \"{machine_id}\"");
        let response: TaskResponse = self
            .core()
            .execute(
                ApiRequest::put(
                    format!("vm/{machine_id}/status/stop"),
                    CommonParams::force(force),
                )
                .with_accept(&[StatusCode::CREATED, StatusCode::OK]),
            )
            .await
            .op_context(context)?;

        let task_id = response.task_id.unwrap_or_default();
        tasks::wait_for_task(self, &task_id, &TaskWait::attempts(TEARDOWN_ATTEMPTS))
            .await
            .op_context(context)?;
        Ok(())
    }

    async fn change_machine_status(&self, machine_id: &str, action: &str) -> Result<()> {
        let context = || format!("failed to {action} machine \"{machine_id}\"");
        let response: TaskResponse = self
            .core()
            .execute(
                ApiRequest::put(
                    format!("vm/{machine_id}/status/{action}"),
                    CommonParams::default(),
                )
                .with_accept(&[StatusCode::CREATED, StatusCode::OK]),
            )
            .await
            .op_context(context)?;

        let task_id = response.task_id.unwrap_or_default();
        tasks::wait_for_task(self, &task_id, &TaskWait::attempts(TEARDOWN_ATTEMPTS))
            .await
            .op_context(context)?;
        Ok(())
    }

    /// Delete the deployed machine data, keeping the definition.
    ///
    /// Use [`CloudApi::delete_machine`] for complete removal.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the destroy task fails
    /// or times out.
    pub async fn destroy_machine(&self, machine_id: &str) -> Result<()> {
        let context = || format!("failed to delete machine \"{machine_id}\"");
        let response: TaskResponse = self
            .core()
            .execute(
                ApiRequest::delete(format!("vm/{machine_id}"), CommonParams::default())
                    .with_accept(&[StatusCode::CREATED, StatusCode::OK]),
            )
            .await
            .op_context(context)?;

        let task_id = response.task_id.unwrap_or_default();
        tasks::wait_for_task(self, &task_id, &TaskWait::attempts(TEARDOWN_ATTEMPTS))
            .await
            .op_context(context)?;
        Ok(())
    }

    /// Delete a machine definition. The machine must be in the
    /// `notcreated` state.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn delete_machine_definition(&self, machine_id: &str) -> Result<()> {
        let _: Envelope<()> = self
            .core()
            .execute(ApiRequest::delete(
                format!("vm/{machine_id}/define"),
                CommonParams::default(),
            ))
            .await
            .op_context(|| format!("failed to delete machine \"{machine_id}\""))?;
        Ok(())
    }

    /// Remove a machine completely, whatever state it is in.
    ///
    /// Waits out transient states first, then runs the stop → destroy →
    /// delete-definition sequence as far as the observed state requires.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when the machine settles in a state the
    /// sequence cannot handle; otherwise any error from the underlying
    /// steps.
    pub async fn delete_machine(&self, machine_id: &str, force: bool) -> Result<()> {
        let context = || format!("failed to delete machine: {machine_id}");

        let mut state = String::new();
        for _ in 0..DEPLOY_ATTEMPTS {
            state = self.machine_state(machine_id).await.op_context(context)?;
            if !is_transient_state(&state) {
                break;
            }
            debug!(machine_id, state, "waiting out transient machine state");
            sleep(DEFAULT_POLL_INTERVAL).await;
        }

        let (stop, destroy) = match state.as_str() {
            "running" => (true, true),
            "stopped" => (false, true),
            "notcreated" => (false, false),
            _ => {
                return Err(Error::InvalidState {
                    machine: machine_id.to_string(),
                    state,
                });
            }
        };

        if stop {
            self.stop_machine(machine_id, force).await.op_context(context)?;
        }
        if destroy {
            self.destroy_machine(machine_id).await.op_context(context)?;
        }
        self.delete_machine_definition(machine_id)
            .await
            .op_context(context)
    }

    /// Bring up a new machine in one call: define, attach disks and NICs,
    /// deploy.
    ///
    /// When any step after the definition fails, the definition is cleaned
    /// up best-effort (a cleanup failure is logged and ignored) and the
    /// original error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error of the sequence.
    pub async fn create_machine(&self, opts: &CreateMachineOpts) -> Result<MachineDefinition> {
        let machine = self.create_machine_definition(&opts.vm).await?;
        let machine_id = machine.identifier();

        for disk in &opts.disks {
            if let Err(err) = self.add_disk_definition(&machine_id, disk).await {
                self.cleanup_definition(&machine_id).await;
                return Err(err);
            }
        }

        for nic in &opts.nics {
            if let Err(err) = self.add_nic_definition(&machine_id, nic).await {
                self.cleanup_definition(&machine_id).await;
                return Err(err);
            }
        }

        if let Err(err) = self.deploy_machine(&machine_id).await {
            self.cleanup_definition(&machine_id).await;
            return Err(err);
        }

        Ok(machine)
    }

    async fn cleanup_definition(&self, machine_id: &str) {
        if let Err(err) = self.delete_machine_definition(machine_id).await {
            warn!(machine_id, error = %err, "cleanup of machine definition failed");
        }
    }
}

fn vm_uuids(machines: &[VmDetails]) -> Vec<String> {
    machines
        .iter()
        .filter_map(|vm| vm.uuid.map(|uuid| uuid.to_string()))
        .collect()
}
