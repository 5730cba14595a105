use crate::pages::{Pages, View};
use actix_web::{
    HttpResponse,
    http::header::{self, ContentType},
};
use log::debug;

/// Trait for converting portal views into HTTP responses
pub trait ViewResponse {
    fn into_response(self, pages: &Pages) -> HttpResponse;
}

impl ViewResponse for View {
    fn into_response(self, pages: &Pages) -> HttpResponse {
        match pages.render(&self) {
            Some(html) => HttpResponse::Ok()
                .content_type(ContentType::html())
                .insert_header((header::CACHE_CONTROL, "no-store"))
                .body(html),
            None => {
                let View::Redirect(path) = self else {
                    return HttpResponse::InternalServerError().finish();
                };
                let location = pages.url(path);
                debug!("redirect to {location}");

                HttpResponse::Found()
                    .append_header((header::LOCATION, location))
                    .finish()
            }
        }
    }
}

/// Render a view for the route that produced it
///
/// # Arguments
/// * `view` - The portal answer to render
/// * `pages` - Page templates
/// * `operation` - Name of the handler, used for logging
///
/// # Returns
/// * `HttpResponse` - `200 OK` with HTML, or `302 Found` for redirects
pub fn handle_view(view: View, pages: &Pages, operation: &str) -> HttpResponse {
    debug!("{operation}() answers with {}", view_name(&view));
    view.into_response(pages)
}

fn view_name(view: &View) -> &'static str {
    match view {
        View::Greeting => "greeting",
        View::WebForm { .. } => "web form",
        View::ValidationFailed(_) => "validation errors",
        View::TestInProgress => "test in progress",
        View::StillTesting => "wait",
        View::NotStarted => "not started",
        View::NotValidated => "not validated",
        View::Result(_) => "result",
        View::GaveUp => "give up",
        View::Closed => "closed",
        View::Redirect(_) => "redirect",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, http::StatusCode};
    use std::net::Ipv4Addr;

    fn pages() -> Pages {
        Pages::new("pi", Ipv4Addr::new(10, 1, 1, 1))
    }

    #[tokio::test]
    async fn page_views_are_html() {
        let response = handle_view(View::GaveUp, &pages(), "giveup");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );

        let body = to_bytes(response.into_body()).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("Stop host pi"));
    }

    #[test]
    fn redirect_points_to_portal_address() {
        let response = handle_view(View::Redirect("/testinprogress"), &pages(), "formsubmit");

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "http://10.1.1.1/testinprogress"
        );
    }
}
