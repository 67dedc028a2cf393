/// Task workflow handlers
use actix_middleware::Principal;
use actix_web::{web, HttpResponse, Result as ActixResult};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::managers;
use crate::models::{CreateTaskRequest, ReshuffleSummary};
use crate::services::TaskService;

/// Create a task and assign it at random
///
/// POST /tasks
pub async fn create_task(
    tasks: web::Data<Arc<TaskService>>,
    caller: Principal,
    body: web::Json<CreateTaskRequest>,
) -> ActixResult<HttpResponse> {
    caller.require(&managers())?;

    let task = tasks.create(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(task))
}

/// GET /tasks
pub async fn list_tasks(
    tasks: web::Data<Arc<TaskService>>,
    _caller: Principal,
) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(tasks.list().await?))
}

/// Mark a task done; only its assignee may do this
///
/// PUT /tasks/{pid}/complete
pub async fn complete_task(
    tasks: web::Data<Arc<TaskService>>,
    caller: Principal,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    let task = tasks.complete(caller.pid, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Reassign every open task
///
/// POST /tasks/reshuffle
pub async fn reshuffle_tasks(
    tasks: web::Data<Arc<TaskService>>,
    _manager: Principal,
) -> ActixResult<HttpResponse> {
    let reassigned = tasks.reshuffle().await?;
    Ok(HttpResponse::Ok().json(ReshuffleSummary { reassigned }))
}
