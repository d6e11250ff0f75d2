use mtree::{euclidean, MTree};
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use std::io::{BufRead, Write};

type Point = (OrderedFloat<f64>, OrderedFloat<f64>);

fn point_distance(a: &Point, b: &Point) -> f64 {
    euclidean(
        &[a.0.into_inner(), a.1.into_inner()],
        &[b.0.into_inner(), b.1.into_inner()],
    )
}

fn main() {
    // Read the labeled coordinates, skipping the header row
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo/data/countries.csv".to_string());
    let file = std::fs::File::open(&path).unwrap();
    let mut places: Vec<(String, Point)> = Vec::new();
    for line in std::io::BufReader::new(file).lines().skip(1) {
        let line = line.unwrap();
        let mut fields = line.split(',');
        let _order = fields.next().unwrap();
        let name = fields.next().unwrap().to_string();
        let x = fields.next().unwrap().trim().parse::<f64>().unwrap();
        let y = fields.next().unwrap().trim().parse::<f64>().unwrap();
        places.push((name, (OrderedFloat(x), OrderedFloat(y))));
    }

    // Index every place
    let mut tree = MTree::with_capacity(2, point_distance).unwrap();
    let mut labels: HashMap<Point, String> = HashMap::new();
    for (name, place) in &places {
        tree.add(place.clone());
        labels.insert(place.clone(), name.clone());
    }
    tree.check();

    // Write the coordinate listing
    let mut output = std::fs::File::create("salida.txt").unwrap();
    for (name, place) in &places {
        writeln!(output, "{}=({},{})", name, place.0, place.1).unwrap();
    }

    println!("Indexed {} places from {}", tree.len(), path);
    println!("Tree height: {}", tree.height());

    // Report each place's three nearest neighbors
    for (name, place) in &places {
        let query = tree.get_nearest(place, f64::INFINITY, 4);
        let neighbors: Vec<String> = query
            .iter()
            .filter(|(data, _)| data != place)
            .map(|(data, distance)| format!("{} ({distance:.1})", labels[&data]))
            .collect();
        println!("{name}: {}", neighbors.join(", "));
    }
}
