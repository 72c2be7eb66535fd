//! Landing page.

use axum::extract::State;
use axum::response::Html;

use crate::api::server::AppState;

pub async fn landing_page(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>SQL Exporter</title></head>\n\
         <body>\n\
         <h1>SQL Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         <p><a href=\"/health\">Health</a></p>\n\
         </body>\n\
         </html>\n",
        path = state.telemetry_path
    ))
}
