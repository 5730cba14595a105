use crate::portal::watchdog::Watchdog;
use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    web::Data,
};
use log::{debug, warn};
use std::{
    future::{Future, Ready, ready},
    pin::Pin,
    rc::Rc,
};

/// Resets the idle watchdog on every request
pub struct ActivityMw;

impl<S, B> Transform<S, ServiceRequest> for ActivityMw
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ActivityMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ActivityMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct ActivityMiddleware<S> {
    service: Rc<S>,
}

type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;

impl<S, B> Service<ServiceRequest> for ActivityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            match req.app_data::<Data<Watchdog>>() {
                Some(watchdog) => watchdog.reset(),
                None => warn!("no watchdog registered"),
            }

            if !req.path().contains("favicon") {
                debug!("received request {}", req.uri());
            }

            service.call(req).await
        })
    }
}
