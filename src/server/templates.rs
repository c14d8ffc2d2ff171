//! Preview pages: mapbox-gl maps over the tile endpoint.
//!
//! Both pages take the Mapbox token from their own `access_token` query
//! parameter, so the server never stores it.

use serde::Serialize;

/// Parameters shared by the preview pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageParams {
    /// Tile URL template with `{z}/{x}/{y}` placeholders
    pub tiles_url: String,
    /// [west, south, east, north] in WGS84
    pub tiles_bounds: [f64; 4],
    /// [lng, lat]
    pub center: [f64; 2],
    /// Initial zoom
    pub zoom: u8,
    pub tiles_minzoom: u8,
    pub tiles_maxzoom: u8,
    /// mapbox-gl `tileSize`
    pub tiles_size: u32,
}

impl PageParams {
    /// Parameters as a JS object literal, safe inside a `<script>` element.
    fn to_script_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| "{}".to_string())
            .replace("</", "<\\/")
    }
}

const MAPBOX_GL_VERSION: &str = "v3.9.4";

/// Head, styles and the shared map bootstrap.
fn page_head(title: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <script src="https://api.mapbox.com/mapbox-gl-js/{MAPBOX_GL_VERSION}/mapbox-gl.js"></script>
    <link href="https://api.mapbox.com/mapbox-gl-js/{MAPBOX_GL_VERSION}/mapbox-gl.css" rel="stylesheet">
    <style>
        body {{
            margin: 0;
            padding: 0;
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        }}
        #map {{
            position: absolute;
            top: 0;
            bottom: 0;
            width: 100%;
        }}
        .panel {{
            position: absolute;
            top: 12px;
            left: 12px;
            width: 260px;
            padding: 12px;
            background: rgba(255, 255, 255, 0.92);
            border-radius: 6px;
            box-shadow: 0 1px 4px rgba(0, 0, 0, 0.3);
            font-size: 12px;
        }}
        .panel label {{
            display: flex;
            justify-content: space-between;
            margin-top: 6px;
        }}
        .panel input[type=range] {{
            width: 140px;
        }}
        .panel code {{
            display: block;
            margin-top: 8px;
            word-break: break-all;
            color: #444;
        }}
        .missing-token {{
            padding: 24px;
        }}
    </style>
</head>"##
    )
}

/// Map setup shared by both pages. Defines `map`, `params` and
/// `addRasterLayer(url)`.
fn map_script(params: &PageParams) -> String {
    let params = params.to_script_json();
    format!(
        r##"
        const params = {params};
        const token = new URLSearchParams(window.location.search).get('access_token');
        if (!token) {{
            document.body.innerHTML =
                '<div class="missing-token">Add <code>?access_token=pk...</code> to the URL ' +
                'with a public Mapbox token to load the map.</div>';
            throw new Error('missing Mapbox access token');
        }}
        mapboxgl.accessToken = token;

        const map = new mapboxgl.Map({{
            container: 'map',
            style: 'mapbox://styles/mapbox/light-v11',
            center: params.center,
            zoom: params.zoom,
            minZoom: 0,
        }});
        map.addControl(new mapboxgl.NavigationControl(), 'top-right');

        function addRasterLayer(url) {{
            if (map.getLayer('raster')) map.removeLayer('raster');
            if (map.getSource('raster')) map.removeSource('raster');
            map.addSource('raster', {{
                type: 'raster',
                tiles: [url],
                tileSize: params.tiles_size,
                bounds: params.tiles_bounds,
                minzoom: params.tiles_minzoom,
                maxzoom: params.tiles_maxzoom,
            }});
            map.addLayer({{ id: 'raster', type: 'raster', source: 'raster' }});
        }}
"##
    )
}

/// The plain viewer: the raster over a basemap, fitted to its bounds.
pub fn render_index(params: &PageParams) -> String {
    let head = page_head("cog-glui");
    let script = map_script(params);
    format!(
        r##"{head}
<body>
    <div id="map"></div>
    <script>
{script}
        map.on('load', () => {{
            addRasterLayer(params.tiles_url);
            map.fitBounds(
                [[params.tiles_bounds[0], params.tiles_bounds[1]],
                 [params.tiles_bounds[2], params.tiles_bounds[3]]],
                {{ padding: 20, animate: false }}
            );
        }});
    </script>
</body>
</html>
"##
    )
}

/// The playground: the viewer plus controls that rewrite the `color` query
/// parameter of the tile URL.
pub fn render_playground(params: &PageParams) -> String {
    let head = page_head("cog-glui playground");
    let script = map_script(params);
    format!(
        r##"{head}
<body>
    <div id="map"></div>
    <div class="panel">
        <strong>Color operations</strong>
        <label>Gamma R <input id="gamma-r" type="range" min="0.1" max="4" step="0.05" value="1"></label>
        <label>Gamma G <input id="gamma-g" type="range" min="0.1" max="4" step="0.05" value="1"></label>
        <label>Gamma B <input id="gamma-b" type="range" min="0.1" max="4" step="0.05" value="1"></label>
        <label>Contrast <input id="contrast" type="range" min="0" max="30" step="0.5" value="0"></label>
        <label>Bias <input id="bias" type="range" min="0.01" max="1" step="0.01" value="0.5"></label>
        <label>Saturation <input id="saturation" type="range" min="0" max="4" step="0.05" value="1"></label>
        <code id="expression">(none)</code>
    </div>
    <script>
{script}
        const inputs = ['gamma-r', 'gamma-g', 'gamma-b', 'contrast', 'bias', 'saturation']
            .map((id) => document.getElementById(id));

        function colorExpression() {{
            const [r, g, b, contrast, bias, saturation] = inputs.map((el) => parseFloat(el.value));
            const ops = [];
            if (r !== 1) ops.push(`gamma r ${{r}}`);
            if (g !== 1) ops.push(`gamma g ${{g}}`);
            if (b !== 1) ops.push(`gamma b ${{b}}`);
            if (contrast !== 0) ops.push(`sigmoidal rgb ${{contrast}} ${{bias}}`);
            if (saturation !== 1) ops.push(`saturation ${{saturation}}`);
            return ops.join(' ');
        }}

        function refresh() {{
            const expr = colorExpression();
            document.getElementById('expression').textContent = expr || '(none)';
            const url = expr
                ? `${{params.tiles_url}}?color=${{encodeURIComponent(expr)}}`
                : params.tiles_url;
            addRasterLayer(url);
        }}

        inputs.forEach((el) => el.addEventListener('change', refresh));

        map.on('load', () => {{
            refresh();
            map.fitBounds(
                [[params.tiles_bounds[0], params.tiles_bounds[1]],
                 [params.tiles_bounds[2], params.tiles_bounds[3]]],
                {{ padding: 20, animate: false }}
            );
        }});
    </script>
</body>
</html>
"##
    )
}
