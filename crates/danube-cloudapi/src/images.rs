//! Disk image and image repository operations.
//!
//! The bare `image/` endpoints operate on the global image store and need
//! SuperAdmin rights; the `dc/{dc}/image/` variants see only the images
//! attached to the active virtual datacenter. Remote repositories live
//! under `imagestore/`.

use crate::client::CloudApi;
use crate::models::{CommonParams, GenericEntity, Image, ImageRepo, ACCESS_PUBLIC};
use crate::tasks::{self, TaskResponse, TaskWait};
use crate::Result;
use danube_core::envelope::Envelope;
use danube_core::error::ResultExt;
use danube_core::request::{ApiRequest, Filter};
use danube_core::Scoped;
use reqwest::StatusCode;
use serde::Serialize;

/// Status query budget for an image delete.
const DELETE_ATTEMPTS: u32 = 120;

/// Status query budget for an image import (downloads can be large).
const IMPORT_ATTEMPTS: u32 = 1800;

#[derive(Debug, Default, Serialize)]
struct ImportImageOpts {
    #[serde(flatten)]
    params: CommonParams,
    #[serde(flatten)]
    entity: GenericEntity,
}

impl Scoped for ImportImageOpts {
    fn datacenter(&self) -> Option<&str> {
        self.params.datacenter()
    }

    fn set_datacenter(&mut self, dc: &str) {
        self.params.set_datacenter(dc);
    }
}

fn full_filter() -> Filter {
    let mut filter = Filter::new();
    filter.set("full", "true");
    filter
}

impl CloudApi {
    /// List the names of all images in the Danube Cloud.
    ///
    /// Needs SuperAdmin rights; with Admin rights use
    /// [`CloudApi::list_attached_images`].
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_images(&self) -> Result<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .core()
            .execute(ApiRequest::get("image"))
            .await
            .op_context(|| "failed to get list of images")?;
        Ok(envelope.into_result())
    }

    /// List full details of the images attached to the active virtual
    /// datacenter.
    ///
    /// # Errors
    ///
    /// A config error when no datacenter scope is active; otherwise any
    /// request failure.
    pub async fn list_attached_images(&self) -> Result<Vec<Image>> {
        let dc = self.scope_for("images")?;
        let envelope: Envelope<Vec<Image>> = self
            .core()
            .execute(ApiRequest::get(format!("dc/{dc}/image")).with_filter(full_filter()))
            .await
            .op_context(|| "failed to get list of images")?;
        Ok(envelope.into_result())
    }

    /// Get the details of one image from the global store.
    ///
    /// Needs SuperAdmin rights; with Admin rights use
    /// [`CloudApi::get_attached_image`].
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the image is unknown.
    pub async fn get_image(&self, image_name: &str) -> Result<Image> {
        let envelope: Envelope<Image> = self
            .core()
            .execute(ApiRequest::get(format!("image/{image_name}")))
            .await
            .op_context(|| format!("failed to get image info for \"{image_name}\""))?;
        Ok(envelope.into_result())
    }

    /// Get the details of an image attached to the active virtual
    /// datacenter.
    ///
    /// # Errors
    ///
    /// A config error when no datacenter scope is active; otherwise any
    /// request failure.
    pub async fn get_attached_image(&self, image_name: &str) -> Result<Image> {
        let dc = self.scope_for("images")?;
        let envelope: Envelope<Image> = self
            .core()
            .execute(ApiRequest::get(format!("dc/{dc}/image/{image_name}")))
            .await
            .op_context(|| format!("failed to get image info for \"{image_name}\""))?;
        Ok(envelope.into_result())
    }

    /// Get the details of an image offered by a remote repository.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the image is unknown.
    pub async fn get_remote_image_info(&self, image_uuid: &str, repo_name: &str) -> Result<Image> {
        let envelope: Envelope<Image> = self
            .core()
            .execute(ApiRequest::get(format!(
                "imagestore/{repo_name}/image/{image_uuid}"
            )))
            .await
            .op_context(|| format!("failed to get image info for \"{image_uuid}\""))?;
        Ok(envelope.into_result())
    }

    /// Delete an image and wait for the server task to finish.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the delete task fails or
    /// times out.
    pub async fn delete_image(&self, image_name: &str) -> Result<()> {
        let context = || format!("failed to delete image \"{image_name}\"");
        let response: TaskResponse = self
            .core()
            .execute(
                ApiRequest::delete(format!("image/{image_name}"), CommonParams::default())
                    .with_accept(&[StatusCode::CREATED, StatusCode::OK]),
            )
            .await
            .op_context(context)?;

        let task_id = response.task_id.unwrap_or_default();
        tasks::wait_for_task(self, &task_id, &TaskWait::attempts(DELETE_ATTEMPTS))
            .await
            .op_context(context)?;
        Ok(())
    }

    /// List the names of all configured remote repositories.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_image_repos(&self) -> Result<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .core()
            .execute(ApiRequest::get("imagestore"))
            .await
            .op_context(|| "failed to get list of configured repos")?;
        Ok(envelope.into_result())
    }

    /// List the names of images offered by a remote repository.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_remote_images(&self, repo_name: &str) -> Result<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .core()
            .execute(ApiRequest::get(format!("imagestore/{repo_name}/image")))
            .await
            .op_context(|| "failed to get list of remote images")?;
        Ok(envelope.into_result())
    }

    /// Get the details of one remote repository.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn get_image_repo(&self, repo_name: &str) -> Result<ImageRepo> {
        let envelope: Envelope<ImageRepo> = self
            .core()
            .execute(ApiRequest::get(format!("imagestore/{repo_name}")))
            .await
            .op_context(|| "failed to get repository info")?;
        Ok(envelope.into_result())
    }

    /// Re-fetch a remote repository's image index.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn refresh_image_repo(&self, repo_name: &str) -> Result<()> {
        let _: Envelope<()> = self
            .core()
            .execute(ApiRequest::put(
                format!("imagestore/{repo_name}"),
                CommonParams::default(),
            ))
            .await
            .op_context(|| "failed to refresh repository")?;
        Ok(())
    }

    /// Import an image from a remote repository under a new name and wait
    /// for the download to finish.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the import task fails or
    /// times out.
    pub async fn import_image(
        &self,
        remote_image_uuid: &str,
        new_image_name: &str,
        repo_name: &str,
    ) -> Result<()> {
        let context = || format!("failed to import image \"{remote_image_uuid}\"");
        let opts = ImportImageOpts {
            entity: GenericEntity {
                name: Some(new_image_name.to_string()),
                access: Some(ACCESS_PUBLIC),
                ..GenericEntity::default()
            },
            ..ImportImageOpts::default()
        };

        let response: TaskResponse = self
            .core()
            .execute(
                ApiRequest::post(
                    format!("imagestore/{repo_name}/image/{remote_image_uuid}"),
                    opts,
                )
                .with_accept(&[StatusCode::OK, StatusCode::CREATED]),
            )
            .await
            .op_context(context)?;

        let task_id = response.task_id.unwrap_or_default();
        tasks::wait_for_task(self, &task_id, &TaskWait::attempts(IMPORT_ATTEMPTS))
            .await
            .op_context(context)?;
        Ok(())
    }
}
