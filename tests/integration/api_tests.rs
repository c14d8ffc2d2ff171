//! API integration tests for tile retrieval, preview pages and error handling.
//!
//! Tests verify:
//! - Tiles in every format decode to the configured tile size
//! - Color expressions change only the selected bands
//! - HTTP response codes, headers and error bodies

use axum::http::StatusCode;

use cog_glui::raster::{CogOptions, NodataOption};

use super::test_utils::{
    body_bytes, fixture_router, fixture_tile_uri, get, router_for, CogBuilder, FIXTURE_TILE,
};

fn header<'a>(response: &'a axum::http::Response<axum::body::Body>, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_png_tile() {
    let response = get(fixture_router(), &fixture_tile_uri("png")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(
        header(&response, "cache-control"),
        "no-store, no-cache, must-revalidate"
    );
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
    assert_eq!(header(&response, "access-control-allow-methods"), "GET");

    let img = image::load_from_memory(&body_bytes(response).await)
        .unwrap()
        .to_rgba8();
    assert_eq!(img.dimensions(), (512, 512));

    // The tile grid matches the raster grid, so pixels come back unchanged
    let [r, g, b, a] = img.get_pixel(100, 40).0;
    assert!(r.abs_diff(50) <= 1, "red {r}");
    assert!(g.abs_diff(20) <= 1, "green {g}");
    assert!(b.abs_diff(76) <= 1, "blue {b}");
    assert_eq!(a, 255);
}

#[tokio::test]
async fn test_jpeg_tile_keeps_requested_extension() {
    let response = get(fixture_router(), &fixture_tile_uri("jpg")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/jpg");

    let bytes = body_bytes(response).await;
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!(img.color(), image::ColorType::Rgb8);
    assert_eq!((img.width(), img.height()), (512, 512));

    let response = get(fixture_router(), &fixture_tile_uri("jpeg")).await;
    assert_eq!(header(&response, "content-type"), "image/jpeg");
}

#[tokio::test]
async fn test_webp_tile() {
    let response = get(fixture_router(), &fixture_tile_uri("webp")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/webp");

    let img = image::load_from_memory(&body_bytes(response).await)
        .unwrap()
        .to_rgba8();
    assert_eq!(img.dimensions(), (512, 512));
    assert_eq!(img.get_pixel(256, 256).0[3], 255);
}

#[tokio::test]
async fn test_tile_size_follows_options() {
    let options = CogOptions {
        tile_size: 256,
        ..CogOptions::default()
    };
    let response = get(
        router_for(CogBuilder::new().build(), options),
        &fixture_tile_uri("png"),
    )
    .await;

    let img = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!((img.width(), img.height()), (256, 256));
}

#[tokio::test]
async fn test_identical_requests_identical_bytes() {
    let router = fixture_router();
    let uri = format!("{}?color=sigmoidal%20rgb%2010%200.3", fixture_tile_uri("png"));

    let a = body_bytes(get(router.clone(), &uri).await).await;
    let b = body_bytes(get(router, &uri).await).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_concurrent_requests() {
    let router = fixture_router();
    let (z, x, y) = FIXTURE_TILE;

    let mut handles = Vec::new();
    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        for format in ["png", "jpg"] {
            let router = router.clone();
            let uri = format!("/tiles/{}/{}/{}.{format}", z + 1, 2 * x + dx, 2 * y + dy);
            handles.push(tokio::spawn(async move { get(router, &uri).await.status() }));
        }
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
}

// =============================================================================
// Color Operations
// =============================================================================

#[tokio::test]
async fn test_gamma_changes_only_blue() {
    let router = fixture_router();
    let plain = body_bytes(get(router.clone(), &fixture_tile_uri("png")).await).await;
    let response = get(
        router,
        &format!("{}?color=gamma%20b%201.8", fixture_tile_uri("png")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let colored = body_bytes(response).await;

    let plain = image::load_from_memory(&plain).unwrap().to_rgba8();
    let colored = image::load_from_memory(&colored).unwrap().to_rgba8();

    let mut blue_changed = 0;
    for (p, c) in plain.pixels().zip(colored.pixels()) {
        assert_eq!(p.0[0], c.0[0]);
        assert_eq!(p.0[1], c.0[1]);
        assert_eq!(p.0[3], c.0[3]);
        if p.0[2] != c.0[2] {
            assert!(c.0[2] > p.0[2], "gamma > 1 brightens mid-tones");
            blue_changed += 1;
        }
    }
    assert!(blue_changed > 0);
}

#[tokio::test]
async fn test_empty_color_is_plain_tile() {
    let router = fixture_router();
    let plain = body_bytes(get(router.clone(), &fixture_tile_uri("png")).await).await;
    let empty = body_bytes(get(router, &format!("{}?color=", fixture_tile_uri("png"))).await).await;
    assert_eq!(plain, empty);
}

#[tokio::test]
async fn test_invalid_color_expression() {
    let response = get(
        fixture_router(),
        &format!("{}?color=boost%20rgb%202", fixture_tile_uri("png")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "invalid_color_expression");
    assert_eq!(body["status"], 400);

    let response = get(
        fixture_router(),
        &format!("{}?color=gamma%20b%200", fixture_tile_uri("png")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Masking
// =============================================================================

fn half_empty(_band: usize, x: u32, _y: u32) -> u8 {
    if x < 256 {
        0
    } else {
        200
    }
}

#[tokio::test]
async fn test_nodata_becomes_transparent() {
    let bytes = CogBuilder::new()
        .with_bands(1)
        .with_pattern(half_empty)
        .with_nodata("0")
        .build();
    let response = get(
        router_for(bytes, CogOptions::default()),
        &fixture_tile_uri("png"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let img = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!(img.color(), image::ColorType::La8);
    let img = img.to_luma_alpha8();
    assert_eq!(img.get_pixel(10, 10).0[1], 0);
    assert_eq!(img.get_pixel(500, 10).0, [200, 255]);
}

#[tokio::test]
async fn test_nodata_disabled_keeps_pixels() {
    let bytes = CogBuilder::new()
        .with_bands(1)
        .with_pattern(half_empty)
        .with_nodata("0")
        .build();
    let options = CogOptions {
        nodata: NodataOption::Disabled,
        ..CogOptions::default()
    };
    let response = get(router_for(bytes, options), &fixture_tile_uri("png")).await;

    let img = image::load_from_memory(&body_bytes(response).await)
        .unwrap()
        .to_luma_alpha8();
    assert_eq!(img.get_pixel(10, 10).0, [0, 255]);
}

#[tokio::test]
async fn test_edge_tile_is_partially_masked() {
    let (z, x, y) = FIXTURE_TILE;
    // One zoom out, the raster covers a quarter of the tile
    let uri = format!("/tiles/{}/{}/{}.png", z - 1, x / 2, y / 2);
    let response = get(fixture_router(), &uri).await;
    assert_eq!(response.status(), StatusCode::OK);

    let img = image::load_from_memory(&body_bytes(response).await)
        .unwrap()
        .to_rgba8();
    let alphas: Vec<u8> = img.pixels().map(|p| p.0[3]).collect();
    assert!(alphas.contains(&0));
    assert!(alphas.contains(&255));
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_tile_outside_raster_is_404() {
    let (z, x, y) = FIXTURE_TILE;
    let response = get(fixture_router(), &format!("/tiles/{z}/{}/{y}.png", x - 500)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["status"], 404);

    // Far away at a high zoom
    let response = get(fixture_router(), "/tiles/18/8240/119094.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_huge_zoom_is_404() {
    for uri in ["/tiles/70/1/1.png", "/tiles/255/4294967295/4294967295.png"] {
        let response = get(fixture_router(), uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_unknown_format_is_400() {
    let response = get(fixture_router(), &fixture_tile_uri("tif")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "invalid_format");
}

#[tokio::test]
async fn test_unroutable_paths_are_404() {
    for uri in [
        "/",
        "/health",
        "/tiles",
        "/tiles/16/21560",
        "/tiles/16/21560/29773",
        "/tiles/a/21560/29773.png",
        "/tiles/16/-1/29773.png",
        "/tiles/16/21560/29773.5.png",
        "/tiles/16/21560/29773/extra.png",
    ] {
        let response = get(fixture_router(), uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

// =============================================================================
// Preview Pages
// =============================================================================

#[tokio::test]
async fn test_index_page() {
    let response = get(fixture_router(), "/index.html").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-type").starts_with("text/html"));

    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains(r#""tiles_url":"http://127.0.0.1:8080/tiles/{z}/{x}/{y}.png""#));
    assert!(html.contains(r#""tiles_size":512"#));
    assert!(html.contains("mapbox-gl"));
}

#[tokio::test]
async fn test_playground_page() {
    let response = get(fixture_router(), "/playground.html").await;
    assert_eq!(response.status(), StatusCode::OK);

    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("?color="));
    assert!(html.contains("tiles_bounds"));
}
