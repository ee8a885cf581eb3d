use rocket::{get, routes};

#[get("/")]
pub fn index() -> &'static str {
    "Envoy relay - Ready"
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index]
}
