use crate::{
    network_backend::NetworkBackend,
    pages::Pages,
    portal::Portal,
    response::handle_view,
};
use actix_web::{Responder, web};
use log::debug;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};

#[derive(Deserialize)]
pub struct WebFormQuery {
    findssids: Option<String>,
}

pub struct Api<Backend>
where
    Backend: NetworkBackend,
{
    pub portal: Arc<Portal<Backend>>,
    pub pages: Pages,
}

impl<Backend> Api<Backend>
where
    Backend: NetworkBackend + Send + Sync + 'static,
{
    pub fn new(portal: Arc<Portal<Backend>>, pages: Pages) -> Self {
        Api { portal, pages }
    }

    /// Register the portal routes, unknown paths fall through to the greeting
    pub fn routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/", web::get().to(Self::greeting))
            .route("/hotspot-detect.html", web::get().to(Self::greeting))
            .route("/webform", web::get().to(Self::webform))
            .route("/formsubmit", web::get().to(Self::formsubmit))
            .route("/testinprogress", web::get().to(Self::testinprogress))
            .route("/checkresult", web::get().to(Self::checkresult))
            .route("/giveup", web::get().to(Self::giveup))
            .default_service(web::route().to(Self::greeting));
    }

    pub async fn greeting(api: web::Data<Self>) -> impl Responder {
        debug!("greeting() called");

        handle_view(api.portal.greet(), &api.pages, "greeting")
    }

    pub async fn webform(api: web::Data<Self>, query: web::Query<WebFormQuery>) -> impl Responder {
        debug!("webform() called");

        let find_ssids = query.findssids.as_deref() == Some("on");

        handle_view(api.portal.web_form(find_ssids).await, &api.pages, "webform")
    }

    pub async fn formsubmit(
        api: web::Data<Self>,
        query: web::Query<HashMap<String, String>>,
    ) -> impl Responder {
        debug!("formsubmit() called");

        handle_view(api.portal.submit(&query).await, &api.pages, "formsubmit")
    }

    pub async fn testinprogress(api: web::Data<Self>) -> impl Responder {
        debug!("testinprogress() called");

        handle_view(api.portal.test_in_progress(), &api.pages, "testinprogress")
    }

    pub async fn checkresult(api: web::Data<Self>) -> impl Responder {
        debug!("checkresult() called");

        handle_view(api.portal.check_result(), &api.pages, "checkresult")
    }

    pub async fn giveup(api: web::Data<Self>) -> impl Responder {
        debug!("giveup() called");

        handle_view(api.portal.give_up(), &api.pages, "giveup")
    }
}
