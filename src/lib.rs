/*!
# Chartboard

A single-page self-service reporting dashboard, built in Rust.

## Overview

Upload a CSV or Excel file, preview the decoded table, build one of four
chart types over its columns, and download the working table back as
CSV. The whole session lives in memory behind a small HTTP API; there is
no database, no account system and no saved state between runs.

## Architecture

The application follows a client-server architecture:

### Frontend Layer
- **Technologies**: HTML, CSS, vanilla JavaScript
- **Key Components**:
  - Upload control - Sends `.csv`/`.xlsx` files to the backend
  - Preview pane - Shows the decoded table with column types
  - Chart controls - Kind, column, label and colour selection
  - Chart view - Displays the rendered PNG, re-fetched on every change

### Backend Layer
- **Technologies**: Rust, axum, plotters
- **Core Components**:
  - Table Model - Typed columns inferred once at load time
  - Loader - CSV (strict UTF-8) and XLSX (first worksheet) decoding
  - Chart Renderer - Bar, line, scatter and histogram PNGs in memory
  - Exporter - Streams the table back as `exported_data.csv`

## Modules

- **table**: column-typed in-memory table model
- **loader**: decoding uploads into tables
- **graph**: chart rendering to PNG
- **downloader**: CSV export
- **app**: routing and request handling

## REST API Endpoints

- `POST /api/upload` - Decode an uploaded file into the session table
- `GET /api/table` - JSON preview of the loaded table
- `GET /api/chart` - Render the requested chart as a PNG image
- `GET /api/export` - Download the table as `exported_data.csv`
*/

pub mod app;
pub mod downloader;
pub mod graph;
pub mod loader;
pub mod table;

/// Re-export everything from these modules to make it easier to use
pub use app::*;
pub use downloader::*;
pub use graph::*;
pub use loader::*;
pub use table::*;
