use ffnet::prelude::*;

fn main() -> Result<()> {
    let x = array![[1., 2.], [3., 4.], [5., 6.], [7., 8.]];
    let y = array![[3.], [7.], [11.], [15.]];

    let mut model = Network::builder()
        .add_dense(2, 10, OperationKind::TanhActivation)
        .add_dense(10, 6, OperationKind::TanhActivation)
        .add_dense(6, 1, OperationKind::LinearActivation)
        .loss_kind(LossKind::Mse)
        .build()?;

    println!("{}", model.summary());

    let mut optimizer = Sgd::new(0.01);
    model.fit(&x, &y, &mut optimizer, 5000, true)?;

    let x_test = array![[2., 3.]];
    let y_test = array![[5.]];

    let eval = model.evaluate(&x_test, &y_test)?;
    println!("\ncost: {}\n", eval);

    let prediction = model.predict(&x_test)?;
    println!("prediction: {}", prediction);

    Ok(())
}
